//! Local model provider for Ollama-compatible servers
//!
//! Talks to `/api/generate` with streaming disabled. Multimodal models
//! (llava and friends) additionally receive base64 images.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{Error, Result};
use crate::generation::PromptBuilder;
use crate::types::PatientContext;

use super::llm::{LlmProvider, ModelResponse};

/// Fixed confidence recorded on recommendations from a local model
pub const LOCAL_CONFIDENCE: f64 = 0.75;

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<Vec<&'a str>>,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    top_p: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Ollama-compatible local model provider
pub struct LocalModelProvider {
    client: Client,
    config: LlmConfig,
}

impl LocalModelProvider {
    /// Create a provider for the configured server and model
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(5)
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    /// Send one non-streaming generate call
    async fn post_generate(
        &self,
        prompt: &str,
        image: Option<&str>,
        timeout: Duration,
    ) -> Result<String> {
        let url = format!("{}/api/generate", self.config.base_url);
        let request = GenerateRequest {
            model: &self.config.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.config.temperature,
                top_p: self.config.top_p,
            },
            images: image.map(|img| vec![img]),
        };

        tracing::debug!(
            "Local LLM request: model={}, prompt_chars={}, image={}",
            self.config.model,
            prompt.len(),
            image.is_some()
        );

        let response = self
            .client
            .post(&url)
            .json(&request)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| self.transport_error(e, timeout))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::provider(format!(
                "LLM request failed: HTTP {} - {}",
                status, body
            )));
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::provider(format!("Failed to parse LLM response: {}", e)))?;

        Ok(generated.response)
    }

    fn transport_error(&self, err: reqwest::Error, timeout: Duration) -> Error {
        if err.is_connect() {
            Error::provider(format!(
                "Cannot connect to local LLM at {}. Make sure Ollama or your local LLM server is running.",
                self.config.base_url
            ))
        } else if err.is_timeout() {
            Error::provider(format!(
                "Local LLM request timed out after {}s",
                timeout.as_secs()
            ))
        } else {
            Error::provider(format!("Local LLM request failed: {}", err))
        }
    }
}

#[async_trait]
impl LlmProvider for LocalModelProvider {
    async fn generate_recommendation(
        &self,
        request_text: &str,
        context: &PatientContext,
    ) -> Result<ModelResponse> {
        let prompt = PromptBuilder::build_generation_prompt(request_text, context);
        let timeout = Duration::from_secs(self.config.generate_timeout_secs);

        tracing::info!("Generating recommendations with local model: {}", self.config.model);

        let text = self.post_generate(&prompt, None, timeout).await?;

        Ok(ModelResponse {
            text,
            model: self.config.model.clone(),
            confidence: Some(LOCAL_CONFIDENCE),
            image_analyzed: false,
        })
    }

    async fn generate_chat(&self, prompt: &str, image: Option<&str>) -> Result<ModelResponse> {
        // Text-only models never see the image
        let image = image.filter(|_| self.supports_images());
        let timeout = Duration::from_secs(self.config.chat_timeout_secs);

        let text = self.post_generate(prompt, image, timeout).await?;

        Ok(ModelResponse {
            text,
            model: self.config.model.clone(),
            confidence: None,
            image_analyzed: image.is_some(),
        })
    }

    fn name(&self) -> &str {
        "local"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    fn supports_images(&self) -> bool {
        let model = self.config.model.to_lowercase();
        self.config
            .multimodal_markers
            .iter()
            .any(|marker| model.contains(&marker.to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::testing::{spawn_server, unused_port};
    use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::sync::Arc;

    type Captured = Arc<Mutex<Vec<Value>>>;

    async fn ollama_stub(reply: &'static str) -> (String, Captured) {
        let captured: Captured = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route(
                "/api/generate",
                post(move |State(seen): State<Captured>, Json(body): Json<Value>| async move {
                    seen.lock().push(body);
                    Json(json!({ "model": "stub", "response": reply, "done": true }))
                }),
            )
            .with_state(Arc::clone(&captured));
        (spawn_server(app).await, captured)
    }

    fn config(base_url: &str, model: &str) -> LlmConfig {
        LlmConfig {
            base_url: base_url.to_string(),
            model: model.to_string(),
            ..LlmConfig::default()
        }
    }

    #[tokio::test]
    async fn test_generate_recommendation_request_shape() {
        let (url, captured) = ollama_stub(r#"{"recommendations": []}"#).await;
        let provider = LocalModelProvider::new(&config(&url, "llama2")).unwrap();

        let response = provider
            .generate_recommendation("Analyze.", &PatientContext::default())
            .await
            .unwrap();

        assert_eq!(response.text, r#"{"recommendations": []}"#);
        assert_eq!(response.model, "llama2");
        assert_eq!(response.confidence, Some(0.75));

        let bodies = captured.lock();
        let body = &bodies[0];
        assert_eq!(body["model"], "llama2");
        assert_eq!(body["stream"], false);
        assert!((body["options"]["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
        assert!((body["options"]["top_p"].as_f64().unwrap() - 0.9).abs() < 1e-6);
        assert!(body["prompt"].as_str().unwrap().contains("Request: Analyze."));
        assert!(body.get("images").is_none());
    }

    #[tokio::test]
    async fn test_chat_image_only_for_multimodal_models() {
        let (url, captured) = ollama_stub("Looks like a clean X-ray.").await;

        let text_only = LocalModelProvider::new(&config(&url, "llama2")).unwrap();
        let reply = text_only.generate_chat("prompt", Some("aGVsbG8=")).await.unwrap();
        assert!(!reply.image_analyzed);

        let vision = LocalModelProvider::new(&config(&url, "LLaVA:13b")).unwrap();
        assert!(vision.supports_images());
        let reply = vision.generate_chat("prompt", Some("aGVsbG8=")).await.unwrap();
        assert!(reply.image_analyzed);
        assert_eq!(reply.text, "Looks like a clean X-ray.");

        let bodies = captured.lock();
        assert!(bodies[0].get("images").is_none());
        assert_eq!(bodies[1]["images"], json!(["aGVsbG8="]));
    }

    #[tokio::test]
    async fn test_non_success_status_is_unavailable() {
        let app = Router::new().route(
            "/api/generate",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "model not loaded") }),
        );
        let url = spawn_server(app).await;
        let provider = LocalModelProvider::new(&config(&url, "llama2")).unwrap();

        let err = provider
            .generate_recommendation("x", &PatientContext::default())
            .await
            .unwrap_err();
        match err {
            Error::ProviderUnavailable(msg) => assert!(msg.contains("500")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_connection_refused_message() {
        let base = format!("http://127.0.0.1:{}", unused_port());
        let provider = LocalModelProvider::new(&config(&base, "llama2")).unwrap();

        let err = provider.generate_chat("hello", None).await.unwrap_err();
        match err {
            Error::ProviderUnavailable(msg) => {
                assert_eq!(
                    msg,
                    format!(
                        "Cannot connect to local LLM at {}. Make sure Ollama or your local LLM server is running.",
                        base
                    )
                );
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreadable_body_is_unavailable() {
        let app = Router::new().route("/api/generate", post(|| async { "not json" }));
        let url = spawn_server(app).await;
        let provider = LocalModelProvider::new(&config(&url, "llama2")).unwrap();

        let err = provider.generate_chat("hello", None).await.unwrap_err();
        assert!(matches!(err, Error::ProviderUnavailable(_)));
    }
}
