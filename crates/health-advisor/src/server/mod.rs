//! HTTP server for the advisor engine

pub mod routes;
pub mod state;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::request::Parts,
    routing::get,
    Router,
};
use std::net::SocketAddr;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::AdvisorConfig;
use crate::error::{Error, Result};
use state::AppState;

/// Header carrying the authenticated user id, set by the upstream auth layer
pub const USER_ID_HEADER: &str = "x-user-id";

/// Build the router with all routes
pub fn build_router(state: AppState) -> Router {
    let enable_cors = state.config().server.enable_cors;
    let max_upload_size = state.config().server.max_upload_size;

    let router = Router::new()
        .route("/health", get(health_check))
        .nest("/api", routes::api_routes(max_upload_size))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new());

    if enable_cors {
        router.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
    } else {
        router
    }
}

/// Advisor HTTP server
pub struct AdvisorServer {
    state: AppState,
}

impl AdvisorServer {
    /// Create a new server, opening storage and the model provider
    pub fn new(config: AdvisorConfig) -> Result<Self> {
        Ok(Self {
            state: AppState::new(config)?,
        })
    }

    /// Start the server
    pub async fn start(self) -> Result<()> {
        let addr: SocketAddr = self
            .address()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid address: {}", e)))?;

        let router = build_router(self.state);

        tracing::info!("Starting health advisor on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| Error::Config(format!("Failed to bind: {}", e)))?;

        axum::serve(listener, router)
            .await
            .map_err(|e| Error::Internal(format!("Server error: {}", e)))?;

        Ok(())
    }

    /// Get the server address
    pub fn address(&self) -> String {
        let server = &self.state.config().server;
        format!("{}:{}", server.host, server.port)
    }
}

/// Authenticated caller, read from the `x-user-id` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallerId(pub i64);

#[async_trait]
impl<S> FromRequestParts<S> for CallerId
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        let value = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| Error::Unauthorized(format!("missing {} header", USER_ID_HEADER)))?;

        value
            .to_str()
            .ok()
            .and_then(|v| v.trim().parse().ok())
            .map(CallerId)
            .ok_or_else(|| Error::Unauthorized(format!("invalid {} header", USER_ID_HEADER)))
    }
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}
