//! Recommendation generation: model first, rules on provider failure

use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

use super::parser::ResponseParser;
use super::prompt::PromptBuilder;
use super::rules::{RuleEngine, RULE_MODEL_ID};
use crate::audit::{AuditEvent, AuditEventType, AuditSink};
use crate::context::PatientContextAssembler;
use crate::error::{Error, Result};
use crate::providers::LlmProvider;
use crate::storage::HealthStore;
use crate::types::{LabStatus, Recommendation, RecommendationRequest};

/// Composes context, prompt, provider, parser and rule fallback into `generate`
pub struct GenerationOrchestrator {
    store: Arc<dyn HealthStore>,
    provider: Arc<dyn LlmProvider>,
    audit: Arc<dyn AuditSink>,
    assembler: PatientContextAssembler,
}

impl GenerationOrchestrator {
    pub fn new(
        store: Arc<dyn HealthStore>,
        provider: Arc<dyn LlmProvider>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            assembler: PatientContextAssembler::new(Arc::clone(&store)),
            store,
            provider,
            audit,
        }
    }

    /// Generate and persist recommendations for a subject the caller owns
    ///
    /// Returns an empty list when the subject is not the caller's. A provider
    /// failure switches to the rule table; unparseable model output yields
    /// nothing.
    pub async fn generate(
        &self,
        owner_id: i64,
        subject_id: i64,
        request: &RecommendationRequest,
    ) -> Result<Vec<Recommendation>> {
        let start = Instant::now();

        let context = match self.assembler.assemble(subject_id, owner_id) {
            Ok(context) => context,
            Err(Error::AccessDenied(_)) => {
                tracing::warn!(
                    "User {} requested recommendations for subject {} they do not own",
                    owner_id,
                    subject_id
                );
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let request_text = PromptBuilder::build_request_text(request);

        let (batch, model, fallback) = match self
            .provider
            .generate_recommendation(&request_text, &context)
            .await
        {
            Ok(response) => {
                let batch = ResponseParser::parse(
                    &response.text,
                    subject_id,
                    &response.model,
                    response.confidence,
                );
                (batch, response.model, false)
            }
            Err(e) => {
                tracing::warn!(
                    "Provider {} failed for subject {}, using rule-based fallback: {}",
                    self.provider.name(),
                    subject_id,
                    e
                );
                let labs = self
                    .store
                    .list_labs_by_status(subject_id, &LabStatus::RULE_CANDIDATES, None)?;
                (
                    RuleEngine::apply(subject_id, &labs),
                    RULE_MODEL_ID.to_string(),
                    true,
                )
            }
        };

        let stored = self.store.insert_recommendations(&batch)?;

        self.audit.emit(
            &AuditEvent::new(
                AuditEventType::PhiAccess,
                owner_id,
                "ai_recommendation",
                "generate_recommendations",
            )
            .with_details(json!({
                "subject_id": subject_id,
                "model": model,
                "count": stored.len(),
                "fallback": fallback,
            })),
        );

        tracing::info!(
            "Generated {} recommendations for subject {} with {} in {:?}",
            stored.len(),
            subject_id,
            model,
            start.elapsed()
        );

        Ok(stored)
    }
}
