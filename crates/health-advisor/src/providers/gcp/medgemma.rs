//! MedGemma client for a dedicated Vertex AI endpoint
//!
//! Uses the endpoint's `chatCompletions` request format over REST.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::auth::GcpAuth;
use crate::config::GcpConfig;
use crate::error::{Error, Result};
use crate::generation::PromptBuilder;
use crate::providers::llm::{LlmProvider, ModelResponse};
use crate::types::PatientContext;

/// Model identifier recorded on generated entities
pub const REMOTE_MODEL_ID: &str = "medgemma-vertex-ai";

/// Fixed confidence recorded on recommendations from the remote model
pub const REMOTE_CONFIDENCE: f64 = 0.85;

#[derive(Serialize)]
struct PredictRequest<'a> {
    instances: Vec<Instance<'a>>,
}

#[derive(Serialize)]
struct Instance<'a> {
    #[serde(rename = "@requestFormat")]
    request_format: &'static str,
    messages: Vec<Message<'a>>,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<&'a str>,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'static str,
    content: Vec<ContentPart<'a>>,
}

#[derive(Serialize)]
struct ContentPart<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

#[derive(Deserialize)]
struct PredictResponse {
    predictions: Predictions,
}

#[derive(Deserialize)]
struct Predictions {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

/// MedGemma provider on a dedicated endpoint
pub struct RemoteMedicalModelProvider {
    auth: Arc<GcpAuth>,
    client: Client,
    url: String,
    system_prompt: String,
    max_tokens: u32,
    timeout: Duration,
}

impl RemoteMedicalModelProvider {
    /// Create a provider for the configured endpoint
    pub fn new(config: &GcpConfig, auth: Arc<GcpAuth>) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            auth,
            client,
            url: config.predict_url(),
            system_prompt: config.system_prompt.clone(),
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }

    /// Predict URL in use
    pub fn endpoint(&self) -> &str {
        &self.url
    }

    /// Send one chatCompletions instance and return the first choice
    async fn predict(&self, prompt: &str, image: Option<&str>) -> Result<String> {
        let token = self
            .auth
            .get_token()
            .await
            .map_err(|e| Error::provider(format!("Failed to obtain access token: {}", e)))?;

        let request = PredictRequest {
            instances: vec![Instance {
                request_format: "chatCompletions",
                messages: vec![
                    Message {
                        role: "system",
                        content: vec![ContentPart {
                            kind: "text",
                            text: &self.system_prompt,
                        }],
                    },
                    Message {
                        role: "user",
                        content: vec![ContentPart {
                            kind: "text",
                            text: prompt,
                        }],
                    },
                ],
                max_tokens: self.max_tokens,
                image,
            }],
        };

        tracing::debug!(
            "MedGemma request: prompt_chars={}, image={}",
            prompt.len(),
            image.is_some()
        );

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(token)
            .json(&request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::provider(format!("MedGemma request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::provider(format!(
                "MedGemma API failed ({}): {}",
                status, body
            )));
        }

        let predicted: PredictResponse = response
            .json()
            .await
            .map_err(|e| Error::provider(format!("Failed to parse MedGemma response: {}", e)))?;

        predicted
            .predictions
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::provider("No predictions returned from model"))
    }
}

#[async_trait]
impl LlmProvider for RemoteMedicalModelProvider {
    async fn generate_recommendation(
        &self,
        request_text: &str,
        context: &PatientContext,
    ) -> Result<ModelResponse> {
        let prompt = PromptBuilder::build_generation_prompt(request_text, context);

        tracing::info!("Generating recommendations with {}", REMOTE_MODEL_ID);

        let text = self.predict(&prompt, None).await?;

        Ok(ModelResponse {
            text,
            model: REMOTE_MODEL_ID.to_string(),
            confidence: Some(REMOTE_CONFIDENCE),
            image_analyzed: false,
        })
    }

    async fn generate_chat(&self, prompt: &str, image: Option<&str>) -> Result<ModelResponse> {
        let text = self.predict(prompt, image).await?;

        Ok(ModelResponse {
            text,
            model: REMOTE_MODEL_ID.to_string(),
            confidence: None,
            image_analyzed: image.is_some(),
        })
    }

    fn name(&self) -> &str {
        "gcp"
    }

    fn model(&self) -> &str {
        REMOTE_MODEL_ID
    }

    fn supports_images(&self) -> bool {
        true
    }
}
