//! Conversational chat over a subject's health data

use base64::Engine;
use serde_json::json;
use std::sync::Arc;

use super::prompt::PromptBuilder;
use crate::audit::{AuditEvent, AuditEventType, AuditSink};
use crate::context::PatientContextAssembler;
use crate::error::{Error, Result};
use crate::providers::LlmProvider;
use crate::storage::HealthStore;
use crate::types::{ChatReply, ChatTurn};

/// Diagnostic returned when the subject is missing or not the caller's
pub const ACCESS_DENIED_REPLY: &str = "Family member not found or access denied";

/// Composes context, chat prompt and provider into `chat`; no fallback
pub struct ChatOrchestrator {
    provider: Arc<dyn LlmProvider>,
    audit: Arc<dyn AuditSink>,
    assembler: PatientContextAssembler,
}

impl ChatOrchestrator {
    pub fn new(
        store: Arc<dyn HealthStore>,
        provider: Arc<dyn LlmProvider>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            provider,
            audit,
            assembler: PatientContextAssembler::new(store),
        }
    }

    /// Answer one chat message with an optional base64 image
    ///
    /// Provider failures and access denial come back as a `ChatReply`
    /// carrying the diagnostic.
    pub async fn chat(
        &self,
        owner_id: i64,
        subject_id: i64,
        message: &str,
        image: Option<&str>,
        history: &[ChatTurn],
    ) -> Result<ChatReply> {
        if let Some(image) = image {
            base64::engine::general_purpose::STANDARD
                .decode(image)
                .map_err(|e| Error::validation(format!("image_data is not valid base64: {}", e)))?;
        }

        let context = match self.assembler.assemble(subject_id, owner_id) {
            Ok(context) => context,
            Err(Error::AccessDenied(_)) => {
                tracing::warn!(
                    "User {} attempted chat about subject {} they do not own",
                    owner_id,
                    subject_id
                );
                self.record(owner_id, subject_id, image.is_some(), "none", false);
                return Ok(ChatReply::failed(ACCESS_DENIED_REPLY));
            }
            Err(e) => return Err(e),
        };

        let prompt = PromptBuilder::build_chat_prompt(message, &context, history, image.is_some());

        let reply = match self.provider.generate_chat(&prompt, image).await {
            Ok(response) => ChatReply {
                response: response.text,
                model: response.model,
                has_image_analysis: response.image_analyzed,
                error: None,
            },
            Err(e) => {
                tracing::warn!("Chat with {} failed: {}", self.provider.name(), e);
                ChatReply::failed(&diagnostic(e))
            }
        };

        self.record(owner_id, subject_id, image.is_some(), &reply.model, !reply.is_error());
        Ok(reply)
    }

    fn record(&self, owner_id: i64, subject_id: i64, has_image: bool, model: &str, success: bool) {
        self.audit.emit(
            &AuditEvent::new(AuditEventType::PhiAccess, owner_id, "ai_chat", "chat_interaction")
                .with_details(json!({
                    "subject_id": subject_id,
                    "has_image": has_image,
                    "model": model,
                }))
                .with_success(success),
        );
    }
}

fn diagnostic(err: Error) -> String {
    match err {
        Error::ProviderUnavailable(message) => message,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::generation::prompt::IMAGE_MARKER;
    use crate::providers::testing::ScriptedProvider;
    use crate::storage::SqliteHealthStore;
    use crate::types::{Medication, Subject};
    use chrono::NaiveDate;

    fn setup(provider: Arc<ScriptedProvider>) -> (ChatOrchestrator, Arc<MemoryAuditSink>, i64) {
        let store = Arc::new(SqliteHealthStore::in_memory().unwrap());
        let subject_id = store
            .insert_subject(&Subject::new(4, "Lin", "Wu", NaiveDate::from_ymd_opt(1975, 8, 1).unwrap()))
            .unwrap();
        store
            .insert_medication(&Medication::new(subject_id, "Warfarin", "5mg"))
            .unwrap();
        let audit = Arc::new(MemoryAuditSink::default());
        let chat = ChatOrchestrator::new(store, provider, audit.clone());
        (chat, audit, subject_id)
    }

    #[tokio::test]
    async fn test_chat_reply_and_prompt() {
        let provider = Arc::new(ScriptedProvider::replying("Leafy greens affect warfarin."));
        let (chat, audit, subject_id) = setup(provider.clone());

        let history = vec![ChatTurn::user("Hi"), ChatTurn::assistant("Hello! How can I help?")];
        let reply = chat
            .chat(4, subject_id, "Can I eat spinach?", None, &history)
            .await
            .unwrap();

        assert_eq!(reply.response, "Leafy greens affect warfarin.");
        assert_eq!(reply.model, "scripted");
        assert!(!reply.has_image_analysis);
        assert!(reply.error.is_none());

        let prompt = &provider.prompts()[0];
        assert!(prompt.contains("Warfarin (5mg)"));
        assert!(prompt.contains("Assistant: Hello! How can I help?"));
        assert!(prompt.contains("User: Can I eat spinach?"));

        let events = audit.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].resource_type, "ai_chat");
        assert_eq!(events[0].action, "chat_interaction");
        assert!(events[0].success);
        assert_eq!(events[0].details["model"], "scripted");
    }

    #[tokio::test]
    async fn test_provider_failure_is_reply_data() {
        let (chat, audit, subject_id) = setup(Arc::new(ScriptedProvider::failing()));

        let reply = chat.chat(4, subject_id, "hello", None, &[]).await.unwrap();

        assert!(reply.is_error());
        assert_eq!(reply.model, "error");
        assert!(reply.response.starts_with("Error: Cannot connect to local LLM"));
        assert!(!audit.events()[0].success);
    }

    #[tokio::test]
    async fn test_access_denied_is_audited() {
        let provider = Arc::new(ScriptedProvider::replying("unused"));
        let (chat, audit, subject_id) = setup(provider.clone());

        let reply = chat.chat(99, subject_id, "hello", None, &[]).await.unwrap();

        assert!(reply.is_error());
        assert_eq!(reply.model, "error");
        assert_eq!(reply.error.as_deref(), Some(ACCESS_DENIED_REPLY));
        assert_eq!(reply.response, format!("Error: {}", ACCESS_DENIED_REPLY));
        assert!(!reply.has_image_analysis);
        assert!(provider.prompts().is_empty());

        let events = audit.events();
        assert_eq!(events.len(), 1);
        assert!(!events[0].success);
        assert_eq!(events[0].user_id, Some(99));
        assert_eq!(events[0].details["model"], "none");
    }

    #[tokio::test]
    async fn test_missing_subject_is_reply_data() {
        let (chat, audit, subject_id) = setup(Arc::new(ScriptedProvider::replying("unused")));

        let reply = chat.chat(4, subject_id + 100, "hello", None, &[]).await.unwrap();

        assert_eq!(reply.error.as_deref(), Some(ACCESS_DENIED_REPLY));
        assert!(!audit.events()[0].success);
    }

    #[tokio::test]
    async fn test_image_marker_and_analysis_flag() {
        let provider = Arc::new(ScriptedProvider::replying("Normal chest film.").with_images());
        let (chat, audit, subject_id) = setup(provider.clone());

        let reply = chat
            .chat(4, subject_id, "What do you see?", Some("aGVsbG8gd29ybGQ="), &[])
            .await
            .unwrap();

        assert!(reply.has_image_analysis);
        assert!(provider.prompts()[0].contains(IMAGE_MARKER));
        assert_eq!(audit.events()[0].details["has_image"], true);
    }

    #[tokio::test]
    async fn test_invalid_image_rejected() {
        let provider = Arc::new(ScriptedProvider::replying("unused"));
        let (chat, _, subject_id) = setup(provider.clone());

        let err = chat
            .chat(4, subject_id, "look", Some("not base64!!"), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(provider.prompts().is_empty());
    }
}
