//! Model provider abstraction
//!
//! Switches between a local Ollama-compatible server and a dedicated
//! Vertex AI endpoint. Selection happens once, at engine construction.

pub mod gcp;
pub mod llm;
pub mod ollama;

#[cfg(test)]
pub(crate) mod testing;

pub use gcp::{GcpAuth, RemoteMedicalModelProvider};
pub use llm::{LlmProvider, ModelResponse};
pub use ollama::LocalModelProvider;

use std::sync::Arc;

use crate::config::{AdvisorConfig, BackendProvider};
use crate::error::Result;

/// Build the provider selected by configuration
///
/// The remote endpoint is used only when the backend is `gcp` and both the
/// project and endpoint identifiers are set; anything else runs locally.
pub fn create_provider(config: &AdvisorConfig) -> Result<Arc<dyn LlmProvider>> {
    if let Some(gcp) = config.remote_model() {
        let auth = Arc::new(GcpAuth::from_config(gcp)?);
        let provider = RemoteMedicalModelProvider::new(gcp, auth)?;
        tracing::info!("Using MedGemma provider at {}", provider.endpoint());
        return Ok(Arc::new(provider));
    }

    if config.backend == BackendProvider::Gcp {
        tracing::warn!("GCP backend selected without project/endpoint id, using local model");
    }

    let provider = LocalModelProvider::new(&config.llm)?;
    tracing::info!(
        "Using local model provider: {} at {}",
        config.llm.model,
        config.llm.base_url
    );
    Ok(Arc::new(provider))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GcpConfig;

    #[test]
    fn test_defaults_to_local() {
        let provider = create_provider(&AdvisorConfig::default()).unwrap();
        assert_eq!(provider.name(), "local");
        assert_eq!(provider.model(), "llama2");
        assert!(!provider.supports_images());
    }

    #[test]
    fn test_incomplete_gcp_falls_back_to_local() {
        let config = AdvisorConfig {
            backend: BackendProvider::Gcp,
            gcp: Some(GcpConfig {
                project_id: "demo".to_string(),
                ..GcpConfig::default()
            }),
            ..AdvisorConfig::default()
        };
        assert_eq!(create_provider(&config).unwrap().name(), "local");
    }

    #[test]
    fn test_complete_gcp_selects_remote() {
        let config = AdvisorConfig {
            backend: BackendProvider::Gcp,
            gcp: Some(GcpConfig {
                project_id: "demo".to_string(),
                endpoint_id: "ep".to_string(),
                service_account_key_path: Some("/nonexistent/sa.json".into()),
                ..GcpConfig::default()
            }),
            ..AdvisorConfig::default()
        };
        let provider = create_provider(&config).unwrap();
        assert_eq!(provider.name(), "gcp");
        assert_eq!(provider.model(), "medgemma-vertex-ai");
        assert!(provider.supports_images());
    }
}
