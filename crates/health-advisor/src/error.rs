//! Error types for the health advisor engine

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type alias for advisor operations
pub type Result<T> = std::result::Result<T, Error>;

/// Advisor errors
#[derive(Debug, Error)]
pub enum Error {
    /// Subject is not owned by the requesting user
    #[error("Access denied to subject {0}")]
    AccessDenied(i64),

    /// Request carried no caller identity
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Subject or recommendation absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Model backend timed out, refused, or answered with garbage
    #[error("Model provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Model text held no parseable recommendation document
    #[error("Malformed model output: {0}")]
    MalformedModelOutput(String),

    /// Caller-supplied value out of range
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// SQLite error
    #[error("Database error: {0}")]
    Database(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a provider-unavailable error
    pub fn provider(message: impl Into<String>) -> Self {
        Self::ProviderUnavailable(message.into())
    }

    /// Create a not-found error
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a database error
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database(message.into())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(err.to_string())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match &self {
            Error::AccessDenied(_) => (StatusCode::NOT_FOUND, "not_found", self.to_string()),
            Error::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg.clone()),
            Error::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone()),
            Error::ProviderUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "provider_unavailable", msg.clone())
            }
            Error::MalformedModelOutput(msg) => {
                (StatusCode::BAD_GATEWAY, "malformed_model_output", msg.clone())
            }
            Error::Validation(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "validation_error", msg.clone())
            }
            Error::Config(msg) => (StatusCode::BAD_REQUEST, "config_error", msg.clone()),
            Error::Database(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", msg.clone())
            }
            Error::Io(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "io_error",
                err.to_string(),
            ),
            Error::Json(err) => (StatusCode::BAD_REQUEST, "json_error", err.to_string()),
            Error::Http(err) => (StatusCode::BAD_GATEWAY, "http_error", err.to_string()),
            Error::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg.clone())
            }
        };

        let body = Json(json!({
            "error": {
                "type": error_type,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}
