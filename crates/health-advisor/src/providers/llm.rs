//! LLM provider trait for recommendation and chat generation

use async_trait::async_trait;

use crate::error::Result;
use crate::types::PatientContext;

/// Raw output of one model call
#[derive(Debug, Clone, PartialEq)]
pub struct ModelResponse {
    /// Free text as returned by the model
    pub text: String,
    /// Model identifier recorded on generated entities
    pub model: String,
    /// Fixed per-provider confidence
    pub confidence: Option<f64>,
    /// Whether an attached image actually reached the model
    pub image_analyzed: bool,
}

/// Trait for model-backed generation
///
/// Implementations:
/// - `LocalModelProvider`: Ollama-compatible server (llama2, llava, etc.)
/// - `RemoteMedicalModelProvider`: dedicated Vertex AI endpoint (MedGemma)
///
/// Every failure (timeout, non-2xx, transport error, unreadable body) is
/// reported as `Error::ProviderUnavailable`.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a JSON recommendation document for the request text and patient context
    async fn generate_recommendation(
        &self,
        request_text: &str,
        context: &PatientContext,
    ) -> Result<ModelResponse>;

    /// Free-form answer to a fully built chat prompt, with an optional base64 image
    async fn generate_chat(&self, prompt: &str, image: Option<&str>) -> Result<ModelResponse>;

    /// Get provider name for logging
    fn name(&self) -> &str;

    /// Get the model being used
    fn model(&self) -> &str;

    /// Whether images passed to `generate_chat` reach the model
    fn supports_images(&self) -> bool {
        false
    }
}
