//! Application state for the advisor server

use std::sync::Arc;

use crate::config::AdvisorConfig;
use crate::engine::AdvisorEngine;
use crate::error::Result;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Configuration
    config: AdvisorConfig,
    /// Recommendation and chat engine
    engine: AdvisorEngine,
}

impl AppState {
    /// Create new application state
    pub fn new(config: AdvisorConfig) -> Result<Self> {
        tracing::info!("Initializing advisor state (backend: {:?})...", config.backend);
        let engine = AdvisorEngine::from_config(&config)?;
        tracing::info!(
            "Engine ready (provider: {}, model: {})",
            engine.provider().name(),
            engine.provider().model()
        );
        Ok(Self::with_engine(config, engine))
    }

    /// Wrap an already-built engine
    pub fn with_engine(config: AdvisorConfig, engine: AdvisorEngine) -> Self {
        Self {
            inner: Arc::new(AppStateInner { config, engine }),
        }
    }

    pub fn config(&self) -> &AdvisorConfig {
        &self.inner.config
    }

    pub fn engine(&self) -> &AdvisorEngine {
        &self.inner.engine
    }
}
