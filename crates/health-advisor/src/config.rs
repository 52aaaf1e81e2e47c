//! Configuration for the advisor engine

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Main advisor configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdvisorConfig {
    /// Model backend (local or gcp)
    #[serde(default)]
    pub backend: BackendProvider,
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// Local model server configuration
    #[serde(default)]
    pub llm: LlmConfig,
    /// GCP configuration (required when backend = gcp)
    #[serde(default)]
    pub gcp: Option<GcpConfig>,
    /// Persistence configuration
    #[serde(default)]
    pub storage: StorageConfig,
    /// Audit trail configuration
    #[serde(default)]
    pub audit: AuditConfig,
}

impl AdvisorConfig {
    /// Load from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        Self::from_toml(&content)
    }

    /// Parse from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config: {}", e)))
    }

    /// Defaults overridden by process environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Apply overrides from process environment variables
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup, using the deployment variable names
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(provider) = lookup("LLM_PROVIDER") {
            self.backend = match provider.to_ascii_lowercase().as_str() {
                "gcp" => BackendProvider::Gcp,
                "local" => BackendProvider::Local,
                other => {
                    return Err(Error::Config(format!("Unknown LLM_PROVIDER: {}", other)));
                }
            };
        }

        if let Some(url) = lookup("LOCAL_LLM_URL") {
            self.llm.base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(model) = lookup("LOCAL_LLM_MODEL") {
            self.llm.model = model;
        }

        let project = lookup("GCP_PROJECT_ID");
        let location = lookup("GCP_LOCATION");
        let endpoint = lookup("GCP_ENDPOINT_ID");
        let dedicated = lookup("GCP_DEDICATED_ENDPOINT");
        if project.is_some() || location.is_some() || endpoint.is_some() || dedicated.is_some() {
            let gcp = self.gcp.get_or_insert_with(GcpConfig::default);
            if let Some(project) = project {
                gcp.project_id = project;
            }
            if let Some(location) = location {
                gcp.location = location;
            }
            if let Some(endpoint) = endpoint {
                gcp.endpoint_id = endpoint;
            }
            if dedicated.is_some() {
                gcp.dedicated_endpoint_url = dedicated;
            }
        }

        if let Some(enabled) = lookup("AUDIT_LOG_ENABLED") {
            self.audit.enabled = parse_bool("AUDIT_LOG_ENABLED", &enabled)?;
        }
        if let Some(path) = lookup("AUDIT_LOG_PATH") {
            self.audit.log_path = Some(PathBuf::from(path));
        }
        if let Some(path) = lookup("DATABASE_PATH") {
            self.storage.database_path = PathBuf::from(path);
        }

        if let Some(host) = lookup("HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.server.port = port
                .parse()
                .map_err(|e| Error::Config(format!("Invalid PORT {}: {}", port, e)))?;
        }

        Ok(())
    }

    /// The GCP section when the remote provider is fully configured
    pub fn remote_model(&self) -> Option<&GcpConfig> {
        match (&self.backend, &self.gcp) {
            (BackendProvider::Gcp, Some(gcp))
                if !gcp.project_id.is_empty() && !gcp.endpoint_id.is_empty() =>
            {
                Some(gcp)
            }
            _ => None,
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!("Invalid boolean for {}: {}", key, other))),
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address
    pub host: String,
    /// Port number
    pub port: u16,
    /// Enable CORS
    pub enable_cors: bool,
    /// Max multipart upload size for image chat (bytes)
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: usize,
}

fn default_max_upload_size() -> usize {
    20 * 1024 * 1024 // 20MB
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            enable_cors: true,
            max_upload_size: default_max_upload_size(),
        }
    }
}

/// Local model server (Ollama-compatible) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Server base URL
    pub base_url: String,
    /// Model name
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Nucleus sampling cutoff
    pub top_p: f32,
    /// Timeout for recommendation generation in seconds
    pub generate_timeout_secs: u64,
    /// Timeout for chat in seconds (image prompts are slower)
    pub chat_timeout_secs: u64,
    /// Model-name substrings that mark a model as accepting images
    #[serde(default = "default_multimodal_markers")]
    pub multimodal_markers: Vec<String>,
}

fn default_multimodal_markers() -> Vec<String> {
    vec!["llava".to_string()]
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "llama2".to_string(),
            temperature: 0.7,
            top_p: 0.9,
            generate_timeout_secs: 60,
            chat_timeout_secs: 120,
            multimodal_markers: default_multimodal_markers(),
        }
    }
}

/// Backend provider selection
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum BackendProvider {
    /// Local model server
    #[default]
    Local,
    /// Dedicated Vertex AI endpoint
    Gcp,
}

/// Dedicated Vertex AI endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GcpConfig {
    /// GCP project ID (number or name)
    #[serde(default)]
    pub project_id: String,
    /// GCP region (e.g., "us-central1")
    #[serde(default = "default_location")]
    pub location: String,
    /// Vertex AI endpoint ID
    #[serde(default)]
    pub endpoint_id: String,
    /// Full predict URL, overriding the one derived from project/location/endpoint
    #[serde(default)]
    pub dedicated_endpoint_url: Option<String>,
    /// System message sent with every request
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,
    /// Completion token budget
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Request timeout in seconds
    #[serde(default = "default_gcp_timeout")]
    pub timeout_secs: u64,
    /// Service account key; falls back to GOOGLE_APPLICATION_CREDENTIALS
    #[serde(default)]
    pub service_account_key_path: Option<PathBuf>,
    /// Metadata server token URL used when no key file is available
    #[serde(default = "default_metadata_token_url")]
    pub metadata_token_url: String,
}

fn default_location() -> String {
    "us-central1".to_string()
}

fn default_system_prompt() -> String {
    "You are an expert medical AI assistant.".to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_gcp_timeout() -> u64 {
    120
}

fn default_metadata_token_url() -> String {
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token"
        .to_string()
}

impl Default for GcpConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            location: default_location(),
            endpoint_id: String::new(),
            dedicated_endpoint_url: None,
            system_prompt: default_system_prompt(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_gcp_timeout(),
            service_account_key_path: None,
            metadata_token_url: default_metadata_token_url(),
        }
    }
}

impl GcpConfig {
    /// Predict URL of the dedicated endpoint
    pub fn predict_url(&self) -> String {
        if let Some(url) = &self.dedicated_endpoint_url {
            return url.clone();
        }
        format!(
            "https://{endpoint}.{location}-{project}.prediction.vertexai.goog/v1/projects/{project}/locations/{location}/endpoints/{endpoint}:predict",
            endpoint = self.endpoint_id,
            location = self.location,
            project = self.project_id,
        )
    }
}

/// Persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file
    pub database_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let database_path = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("health-advisor")
            .join("health.db");

        Self { database_path }
    }
}

/// Audit trail configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Emit audit events at all
    pub enabled: bool,
    /// JSON-lines audit file; events go to tracing when unset
    #[serde(default)]
    pub log_path: Option<PathBuf>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            log_path: None,
        }
    }
}
