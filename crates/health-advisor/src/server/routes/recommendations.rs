//! Recommendation generation and feedback endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::server::{state::AppState, CallerId};
use crate::types::{Feedback, Recommendation, RecommendationRequest};

/// Body of a generate call
#[derive(Debug, Deserialize)]
pub struct GenerateRequest {
    pub subject_id: i64,
    #[serde(flatten)]
    pub options: RecommendationRequest,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default = "default_active_only")]
    pub active_only: bool,
}

fn default_active_only() -> bool {
    true
}

/// POST /api/recommendations/generate
pub async fn generate_recommendations(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Json(request): Json<GenerateRequest>,
) -> Result<Json<Vec<Recommendation>>> {
    tracing::info!(
        "Generate for subject {} (focus: {:?})",
        request.subject_id,
        request.options.focus_areas
    );

    let recommendations = state
        .engine()
        .generate(user_id, request.subject_id, &request.options)
        .await?;

    Ok(Json(recommendations))
}

/// GET /api/recommendations/subject/:subject_id
pub async fn list_recommendations(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Path(subject_id): Path<i64>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<Recommendation>>> {
    let recommendations = state
        .engine()
        .list(user_id, subject_id, params.active_only)?;
    Ok(Json(recommendations))
}

/// POST /api/recommendations/:id/acknowledge
pub async fn acknowledge_recommendation(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Path(id): Path<i64>,
    feedback: Option<Json<Feedback>>,
) -> Result<Json<Recommendation>> {
    let feedback = feedback.map(|Json(f)| f).unwrap_or_default();

    state
        .engine()
        .acknowledge(user_id, id, &feedback)?
        .map(Json)
        .ok_or_else(|| Error::not_found(format!("Recommendation {}", id)))
}

/// POST /api/recommendations/:id/dismiss
pub async fn dismiss_recommendation(
    State(state): State<AppState>,
    CallerId(user_id): CallerId,
    Path(id): Path<i64>,
) -> Result<StatusCode> {
    if state.engine().dismiss(user_id, id)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::not_found(format!("Recommendation {}", id)))
    }
}

#[cfg(test)]
mod tests {
    use crate::audit::MemoryAuditSink;
    use crate::config::AdvisorConfig;
    use crate::engine::AdvisorEngine;
    use crate::providers::testing::ScriptedProvider;
    use crate::server::{build_router, state::AppState};
    use crate::storage::SqliteHealthStore;
    use crate::types::{LabResult, LabStatus, Recommendation, Subject};
    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
        Router,
    };
    use chrono::{NaiveDate, TimeZone, Utc};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app() -> (Router, i64) {
        let store = Arc::new(SqliteHealthStore::in_memory().unwrap());
        let subject_id = store
            .insert_subject(&Subject::new(7, "Sam", "Okafor", NaiveDate::from_ymd_opt(1992, 9, 9).unwrap()))
            .unwrap();
        store
            .insert_lab_result(&LabResult::new(
                subject_id,
                "Vitamin D, 25-Hydroxy",
                LabStatus::Low,
                Utc.with_ymd_and_hms(2026, 5, 5, 7, 30, 0).unwrap(),
            ))
            .unwrap();

        let engine = AdvisorEngine::new(
            store,
            Arc::new(ScriptedProvider::failing()),
            Arc::new(MemoryAuditSink::default()),
        );
        let state = AppState::with_engine(AdvisorConfig::default(), engine);
        (build_router(state), subject_id)
    }

    fn request(method: Method, uri: &str, user: Option<i64>, body: Option<Value>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header("x-user-id", user.to_string());
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn generate(app: &Router, subject_id: i64) -> Vec<Recommendation> {
        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                "/api/recommendations/generate",
                Some(7),
                Some(json!({ "subject_id": subject_id, "focus_areas": ["bone_health"] })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        serde_json::from_value(json_body(response).await).unwrap()
    }

    #[tokio::test]
    async fn test_missing_identity_is_unauthorized() {
        let (app, subject_id) = app();
        let response = app
            .oneshot(request(
                Method::GET,
                &format!("/api/recommendations/subject/{}", subject_id),
                None,
                None,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(response).await["error"]["type"], "unauthorized");
    }

    #[tokio::test]
    async fn test_generate_and_list() {
        let (app, subject_id) = app();

        let generated = generate(&app, subject_id).await;
        assert_eq!(generated.len(), 1);
        assert_eq!(generated[0].supplement_name.as_deref(), Some("Vitamin D3"));
        assert!(!generated[0].disclaimer.is_empty());

        let response = app
            .clone()
            .oneshot(request(
                Method::GET,
                &format!("/api/recommendations/subject/{}", subject_id),
                Some(7),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await.as_array().unwrap().len(), 1);

        // Another user's view of the subject is empty, not an error
        let response = app
            .oneshot(request(
                Method::GET,
                &format!("/api/recommendations/subject/{}", subject_id),
                Some(8),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(json_body(response).await.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_acknowledge_and_dismiss() {
        let (app, subject_id) = app();
        let id = generate(&app, subject_id).await[0].id;

        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                &format!("/api/recommendations/{}/acknowledge", id),
                Some(7),
                Some(json!({ "rating": 4, "feedback": "taking it" })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["is_acknowledged"], true);
        assert_eq!(body["user_rating"], 4);
        assert_eq!(body["user_feedback"], "taking it");

        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                &format!("/api/recommendations/{}/acknowledge", id),
                Some(7),
                Some(json!({ "rating": 9 })),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                &format!("/api/recommendations/{}/dismiss", id),
                Some(8),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .clone()
            .oneshot(request(
                Method::POST,
                &format!("/api/recommendations/{}/dismiss", id),
                Some(7),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = app
            .oneshot(request(
                Method::GET,
                &format!("/api/recommendations/subject/{}?active_only=false", subject_id),
                Some(7),
                None,
            ))
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body[0]["is_active"], false);
        assert_eq!(body[0]["is_acknowledged"], true);
    }

    #[tokio::test]
    async fn test_acknowledge_without_body() {
        let (app, subject_id) = app();
        let id = generate(&app, subject_id).await[0].id;

        let response = app
            .oneshot(request(
                Method::POST,
                &format!("/api/recommendations/{}/acknowledge", id),
                Some(7),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["is_acknowledged"], true);
        assert_eq!(body["user_rating"], Value::Null);
    }
}
