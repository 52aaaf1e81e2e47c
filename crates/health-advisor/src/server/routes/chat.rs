//! Chat endpoint

use axum::{
    extract::{Multipart, State},
    Json,
};
use base64::Engine;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::server::{state::AppState, CallerId};
use crate::types::{ChatReply, ChatTurn};

/// Chat request body
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub subject_id: i64,
    pub message: String,
    /// Base64-encoded image
    #[serde(default)]
    pub image_data: Option<String>,
    #[serde(default)]
    pub conversation_history: Vec<ChatTurn>,
}

/// POST /api/recommendations/chat
pub async fn chat(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatReply>> {
    if request.message.trim().is_empty() {
        return Err(Error::validation("message must not be empty"));
    }

    tracing::debug!(
        "Chat for subject {} ({} history turns, image: {})",
        request.subject_id,
        request.conversation_history.len(),
        request.image_data.is_some()
    );

    let reply = state
        .engine()
        .chat(
            user_id,
            request.subject_id,
            &request.message,
            request.image_data.as_deref(),
            &request.conversation_history,
        )
        .await?;

    Ok(Json(reply))
}

/// POST /api/recommendations/chat/upload - Chat with an optional uploaded image
///
/// Multipart fields: `subject_id` (or `family_member_id`), `message`,
/// optional `conversation_history` (JSON array) and optional `image`/`file`.
/// Failures past form parsing come back as an error reply, not a status code.
pub async fn chat_upload(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    mut multipart: Multipart,
) -> Result<Json<ChatReply>> {
    let mut subject_id: Option<i64> = None;
    let mut message: Option<String> = None;
    let mut history: Vec<ChatTurn> = Vec::new();
    let mut image_data: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        Error::validation(format!("Failed to read multipart field: {}", e))
    })? {
        let name = field.name().unwrap_or("").to_string();

        match name.as_str() {
            "subject_id" | "family_member_id" => {
                let text = field.text().await.map_err(|e| {
                    Error::validation(format!("Failed to read {}: {}", name, e))
                })?;
                subject_id = Some(text.trim().parse().map_err(|e| {
                    Error::validation(format!("Invalid {} {:?}: {}", name, text, e))
                })?);
            }
            "message" => {
                message = Some(field.text().await.map_err(|e| {
                    Error::validation(format!("Failed to read message: {}", e))
                })?);
            }
            "conversation_history" | "history" => {
                let data = field.bytes().await.map_err(|e| {
                    Error::validation(format!("Failed to read {}: {}", name, e))
                })?;
                if !data.is_empty() {
                    history = serde_json::from_slice(&data).map_err(|e| {
                        Error::validation(format!("Invalid {}: {}", name, e))
                    })?;
                }
            }
            "image" | "file" => {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let data = field.bytes().await.map_err(|e| {
                    Error::validation(format!("Failed to read {}: {}", filename, e))
                })?;
                if !data.is_empty() {
                    tracing::info!("Chat upload: {} ({} bytes)", filename, data.len());
                    image_data = Some(base64::engine::general_purpose::STANDARD.encode(&data));
                }
            }
            _ => tracing::debug!("Ignoring multipart field {}", name),
        }
    }

    let subject_id =
        subject_id.ok_or_else(|| Error::validation("subject_id field is required"))?;
    let message = message
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| Error::validation("message must not be empty"))?;

    let reply = match state
        .engine()
        .chat(user_id, subject_id, &message, image_data.as_deref(), &history)
        .await
    {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!("Chat upload for subject {} failed: {}", subject_id, e);
            ChatReply::failed(&e.to_string())
        }
    };

    Ok(Json(reply))
}

#[cfg(test)]
mod tests {
    use crate::audit::MemoryAuditSink;
    use crate::config::AdvisorConfig;
    use crate::engine::AdvisorEngine;
    use crate::providers::testing::ScriptedProvider;
    use crate::server::{build_router, state::AppState};
    use crate::storage::SqliteHealthStore;
    use crate::types::Subject;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Request, StatusCode},
        Router,
    };
    use chrono::NaiveDate;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(provider: ScriptedProvider) -> (Router, i64) {
        app_with(Arc::new(provider))
    }

    fn app_with(provider: Arc<ScriptedProvider>) -> (Router, i64) {
        let store = Arc::new(SqliteHealthStore::in_memory().unwrap());
        let subject_id = store
            .insert_subject(&Subject::new(5, "Mia", "Chen", NaiveDate::from_ymd_opt(2001, 2, 2).unwrap()))
            .unwrap();
        let engine = AdvisorEngine::new(
            store,
            provider,
            Arc::new(MemoryAuditSink::default()),
        );
        (
            build_router(AppState::with_engine(AdvisorConfig::default(), engine)),
            subject_id,
        )
    }

    fn post(user: i64, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/recommendations/chat")
            .header("x-user-id", user.to_string())
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_chat_reply() {
        let (app, subject_id) = app(ScriptedProvider::replying("Drink more water."));

        let response = app
            .oneshot(post(
                5,
                json!({
                    "subject_id": subject_id,
                    "message": "Any tips?",
                    "conversation_history": [
                        { "role": "user", "content": "Hello" },
                        { "role": "assistant", "content": "Hi there" }
                    ]
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["response"], "Drink more water.");
        assert_eq!(body["has_image_analysis"], false);
        assert!(body.get("error").is_none());
    }

    #[tokio::test]
    async fn test_provider_failure_is_ok_with_error() {
        let (app, subject_id) = app(ScriptedProvider::failing());

        let response = app
            .oneshot(post(5, json!({ "subject_id": subject_id, "message": "hello" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["model"], "error");
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_foreign_subject_is_error_reply() {
        let (app, subject_id) = app(ScriptedProvider::replying("unused"));

        let response = app
            .oneshot(post(6, json!({ "subject_id": subject_id, "message": "hello" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["model"], "error");
        assert_eq!(body["error"], "Family member not found or access denied");
        assert_eq!(body["response"], "Error: Family member not found or access denied");
    }

    #[tokio::test]
    async fn test_blank_message_rejected() {
        let (app, subject_id) = app(ScriptedProvider::replying("unused"));

        let response = app
            .oneshot(post(5, json!({ "subject_id": subject_id, "message": "   " })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    const BOUNDARY: &str = "advisor-test-boundary";

    enum Part<'a> {
        Text(&'a str, &'a str),
        File(&'a str, &'a str, &'a [u8]),
    }

    fn upload(user: i64, parts: &[Part]) -> Request<Body> {
        let mut body: Vec<u8> = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name)
                            .as_bytes(),
                    );
                    body.extend_from_slice(value.as_bytes());
                }
                Part::File(name, filename, data) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                             Content-Type: application/octet-stream\r\n\r\n",
                            name, filename
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(data);
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        Request::builder()
            .method("POST")
            .uri("/api/recommendations/chat/upload")
            .header("x-user-id", user.to_string())
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_upload_encodes_image() {
        let provider = Arc::new(ScriptedProvider::replying("No fracture visible.").with_images());
        let (app, subject_id) = app_with(provider.clone());
        let id = subject_id.to_string();

        let response = app
            .oneshot(upload(
                5,
                &[
                    Part::Text("family_member_id", &id),
                    Part::Text("message", "What does this X-ray show?"),
                    Part::Text(
                        "conversation_history",
                        r#"[{"role":"user","content":"I fell yesterday"}]"#,
                    ),
                    Part::File("image", "xray.png", b"\x89PNG fake image bytes"),
                ],
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["response"], "No fracture visible.");
        assert_eq!(body["has_image_analysis"], true);

        let prompt = &provider.prompts()[0];
        assert!(prompt.contains("User: I fell yesterday"));
        assert!(prompt.contains("What does this X-ray show?"));
    }

    #[tokio::test]
    async fn test_upload_without_image() {
        let (app, subject_id) = app(ScriptedProvider::replying("Rest and hydrate."));
        let id = subject_id.to_string();

        let response = app
            .oneshot(upload(5, &[Part::Text("subject_id", &id), Part::Text("message", "Tired")]))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["response"], "Rest and hydrate.");
        assert_eq!(body["has_image_analysis"], false);
    }

    #[tokio::test]
    async fn test_upload_provider_failure_is_error_reply() {
        let (app, subject_id) = app(ScriptedProvider::failing());
        let id = subject_id.to_string();

        let response = app
            .oneshot(upload(
                5,
                &[
                    Part::Text("subject_id", &id),
                    Part::Text("message", "Look at this"),
                    Part::File("file", "scan.jpg", b"jpeg bytes"),
                ],
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["model"], "error");
        assert_eq!(body["has_image_analysis"], false);
        assert!(body["response"].as_str().unwrap().starts_with("Error: "));
    }

    #[tokio::test]
    async fn test_upload_requires_subject_and_message() {
        let (app, subject_id) = app(ScriptedProvider::replying("unused"));
        let id = subject_id.to_string();

        let response = app
            .clone()
            .oneshot(upload(5, &[Part::Text("message", "hello")]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let response = app
            .oneshot(upload(5, &[Part::Text("subject_id", &id)]))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
