//! Caller-facing entry point tying storage, provider and audit together

use std::sync::Arc;

use crate::audit::{self, AuditSink};
use crate::config::AdvisorConfig;
use crate::error::Result;
use crate::feedback::FeedbackLifecycle;
use crate::generation::{ChatOrchestrator, GenerationOrchestrator};
use crate::providers::{create_provider, LlmProvider};
use crate::storage::{HealthStore, SqliteHealthStore};
use crate::types::{ChatReply, ChatTurn, Feedback, Recommendation, RecommendationRequest};

/// Health advisor engine
pub struct AdvisorEngine {
    store: Arc<dyn HealthStore>,
    provider: Arc<dyn LlmProvider>,
    generator: GenerationOrchestrator,
    chat: ChatOrchestrator,
    feedback: FeedbackLifecycle,
}

impl AdvisorEngine {
    pub fn new(
        store: Arc<dyn HealthStore>,
        provider: Arc<dyn LlmProvider>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            generator: GenerationOrchestrator::new(
                Arc::clone(&store),
                Arc::clone(&provider),
                Arc::clone(&audit),
            ),
            chat: ChatOrchestrator::new(Arc::clone(&store), Arc::clone(&provider), Arc::clone(&audit)),
            feedback: FeedbackLifecycle::new(Arc::clone(&store), audit),
            store,
            provider,
        }
    }

    /// Open the configured database, provider and audit sink
    pub fn from_config(config: &AdvisorConfig) -> Result<Self> {
        let store = Arc::new(SqliteHealthStore::new(&config.storage.database_path)?);
        tracing::info!("Database: {}", config.storage.database_path.display());

        let provider = create_provider(config)?;
        let audit = audit::from_config(&config.audit)?;

        Ok(Self::new(store, provider, audit))
    }

    /// The provider every call goes through
    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    pub async fn generate(
        &self,
        owner_id: i64,
        subject_id: i64,
        request: &RecommendationRequest,
    ) -> Result<Vec<Recommendation>> {
        self.generator.generate(owner_id, subject_id, request).await
    }

    /// Recommendations for a subject the caller owns; empty otherwise
    pub fn list(&self, owner_id: i64, subject_id: i64, active_only: bool) -> Result<Vec<Recommendation>> {
        if self.store.load_subject(subject_id, owner_id)?.is_none() {
            return Ok(Vec::new());
        }
        self.store.list_recommendations(subject_id, active_only)
    }

    pub fn acknowledge(
        &self,
        owner_id: i64,
        recommendation_id: i64,
        feedback: &Feedback,
    ) -> Result<Option<Recommendation>> {
        self.feedback.acknowledge(owner_id, recommendation_id, feedback)
    }

    pub fn dismiss(&self, owner_id: i64, recommendation_id: i64) -> Result<bool> {
        self.feedback.dismiss(owner_id, recommendation_id)
    }

    pub async fn chat(
        &self,
        owner_id: i64,
        subject_id: i64,
        message: &str,
        image: Option<&str>,
        history: &[ChatTurn],
    ) -> Result<ChatReply> {
        self.chat.chat(owner_id, subject_id, message, image, history).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditSink;
    use crate::config::AuditConfig;
    use crate::providers::testing::ScriptedProvider;
    use crate::types::{LabResult, LabStatus, Priority, Subject};
    use chrono::{NaiveDate, TimeZone, Utc};

    #[tokio::test]
    async fn test_generate_then_list_and_dismiss() {
        let store = Arc::new(SqliteHealthStore::in_memory().unwrap());
        let subject_id = store
            .insert_subject(&Subject::new(3, "Ana", "Ruiz", NaiveDate::from_ymd_opt(1980, 6, 15).unwrap()))
            .unwrap();
        store
            .insert_lab_result(&LabResult::new(
                subject_id,
                "Serum Iron",
                LabStatus::Low,
                Utc.with_ymd_and_hms(2026, 2, 1, 8, 0, 0).unwrap(),
            ))
            .unwrap();

        let engine = AdvisorEngine::new(
            store,
            Arc::new(ScriptedProvider::failing()),
            Arc::new(MemoryAuditSink::default()),
        );

        let generated = engine
            .generate(3, subject_id, &RecommendationRequest::default())
            .await
            .unwrap();
        assert_eq!(generated.len(), 1);
        assert_eq!(generated[0].priority, Priority::High);

        assert_eq!(engine.list(3, subject_id, true).unwrap().len(), 1);
        assert!(engine.list(4, subject_id, false).unwrap().is_empty());

        assert!(engine.dismiss(3, generated[0].id).unwrap());
        assert!(engine.list(3, subject_id, true).unwrap().is_empty());
        assert_eq!(engine.list(3, subject_id, false).unwrap().len(), 1);
    }

    #[test]
    fn test_from_config_opens_database() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AdvisorConfig::default();
        config.storage.database_path = dir.path().join("data").join("advisor.db");
        config.audit = AuditConfig {
            enabled: false,
            log_path: None,
        };

        let engine = AdvisorEngine::from_config(&config).unwrap();
        assert_eq!(engine.provider().name(), "local");
        assert!(config.storage.database_path.exists());
    }
}
