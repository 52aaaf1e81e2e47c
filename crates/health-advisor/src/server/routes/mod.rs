//! API routes for the advisor server

pub mod chat;
pub mod recommendations;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::server::state::AppState;

/// Build all API routes
pub fn api_routes(max_upload_size: usize) -> Router<AppState> {
    Router::new()
        .route(
            "/recommendations/generate",
            post(recommendations::generate_recommendations),
        )
        .route(
            "/recommendations/subject/:subject_id",
            get(recommendations::list_recommendations),
        )
        .route(
            "/recommendations/:id/acknowledge",
            post(recommendations::acknowledge_recommendation),
        )
        .route(
            "/recommendations/:id/dismiss",
            post(recommendations::dismiss_recommendation),
        )
        .route("/recommendations/chat", post(chat::chat))
        // Image chat from a file upload
        .route(
            "/recommendations/chat/upload",
            post(chat::chat_upload).layer(DefaultBodyLimit::max(max_upload_size)),
        )
        .route("/info", get(info))
}

/// API info endpoint
async fn info() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "name": "health-advisor",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Health recommendations and chat over a subject's health data",
        "endpoints": {
            "POST /api/recommendations/generate": "Generate recommendations for a subject",
            "GET /api/recommendations/subject/:id": "List a subject's recommendations",
            "POST /api/recommendations/:id/acknowledge": "Acknowledge with optional feedback",
            "POST /api/recommendations/:id/dismiss": "Dismiss a recommendation",
            "POST /api/recommendations/chat": "Chat about a subject's health data",
            "POST /api/recommendations/chat/upload": "Chat with an uploaded image (multipart)"
        }
    }))
}
