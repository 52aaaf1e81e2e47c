//! Test doubles: local HTTP servers standing in for model and token
//! endpoints, and an in-process scripted provider

use async_trait::async_trait;
use axum::Router;
use parking_lot::Mutex;
use tokio::net::TcpListener;

use super::llm::{LlmProvider, ModelResponse};
use crate::error::{Error, Result};
use crate::types::PatientContext;

/// Serve `app` on an ephemeral localhost port and return its base URL
pub async fn spawn_server(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// A localhost port with nothing listening on it
pub fn unused_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

/// Provider returning canned text, or failing when no text is set
pub struct ScriptedProvider {
    reply: Option<String>,
    model: String,
    images: bool,
    contexts: Mutex<Vec<PatientContext>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn replying(text: &str) -> Self {
        Self {
            reply: Some(text.to_string()),
            model: "scripted".to_string(),
            images: false,
            contexts: Mutex::new(Vec::new()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            reply: None,
            ..Self::replying("")
        }
    }

    pub fn with_images(mut self) -> Self {
        self.images = true;
        self
    }

    /// Contexts received by `generate_recommendation`
    pub fn contexts(&self) -> Vec<PatientContext> {
        self.contexts.lock().clone()
    }

    /// Prompts received by `generate_chat`
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }

    fn respond(&self, image_analyzed: bool) -> Result<ModelResponse> {
        match &self.reply {
            Some(text) => Ok(ModelResponse {
                text: text.clone(),
                model: self.model.clone(),
                confidence: Some(0.75),
                image_analyzed,
            }),
            None => Err(Error::provider("Cannot connect to local LLM at http://127.0.0.1:9")),
        }
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn generate_recommendation(
        &self,
        _request_text: &str,
        context: &PatientContext,
    ) -> Result<ModelResponse> {
        self.contexts.lock().push(context.clone());
        self.respond(false)
    }

    async fn generate_chat(&self, prompt: &str, image: Option<&str>) -> Result<ModelResponse> {
        self.prompts.lock().push(prompt.to_string());
        self.respond(image.is_some() && self.images)
    }

    fn name(&self) -> &str {
        "scripted"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn supports_images(&self) -> bool {
        self.images
    }
}
