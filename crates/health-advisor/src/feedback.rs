//! Acknowledge and dismiss transitions on persisted recommendations

use chrono::Utc;
use std::sync::Arc;

use crate::audit::{AuditEvent, AuditEventType, AuditSink};
use crate::error::Result;
use crate::storage::HealthStore;
use crate::types::{Feedback, Recommendation, RecommendationUpdate};

/// The only writer of a recommendation after creation
pub struct FeedbackLifecycle {
    store: Arc<dyn HealthStore>,
    audit: Arc<dyn AuditSink>,
}

impl FeedbackLifecycle {
    pub fn new(store: Arc<dyn HealthStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    /// Mark acknowledged and record whichever feedback fields were supplied
    ///
    /// `None` when the recommendation is missing or belongs to another owner.
    pub fn acknowledge(
        &self,
        owner_id: i64,
        recommendation_id: i64,
        feedback: &Feedback,
    ) -> Result<Option<Recommendation>> {
        feedback.validate()?;

        if self.owned(owner_id, recommendation_id)?.is_none() {
            return Ok(None);
        }

        let now = Utc::now();
        let update = RecommendationUpdate {
            is_acknowledged: Some(true),
            acknowledged_at: Some(now),
            user_rating: feedback.user_rating,
            user_feedback: feedback.user_feedback.clone(),
            is_followed: feedback.is_followed,
            ..RecommendationUpdate::at(now)
        };

        let updated = self.store.update_recommendation(recommendation_id, &update)?;
        if updated.is_some() {
            self.record(owner_id, recommendation_id, "acknowledge_recommendation");
        }
        Ok(updated)
    }

    /// Deactivate; acknowledgement fields are left as they are
    pub fn dismiss(&self, owner_id: i64, recommendation_id: i64) -> Result<bool> {
        if self.owned(owner_id, recommendation_id)?.is_none() {
            return Ok(false);
        }

        let update = RecommendationUpdate {
            is_active: Some(false),
            ..RecommendationUpdate::at(Utc::now())
        };

        let dismissed = self
            .store
            .update_recommendation(recommendation_id, &update)?
            .is_some();
        if dismissed {
            self.record(owner_id, recommendation_id, "dismiss_recommendation");
        }
        Ok(dismissed)
    }

    fn owned(&self, owner_id: i64, recommendation_id: i64) -> Result<Option<Recommendation>> {
        let Some(rec) = self.store.get_recommendation(recommendation_id)? else {
            return Ok(None);
        };

        Ok(self
            .store
            .load_subject(rec.subject_id, owner_id)?
            .map(|_| rec))
    }

    fn record(&self, owner_id: i64, recommendation_id: i64, action: &str) {
        self.audit.emit(
            &AuditEvent::new(AuditEventType::PhiUpdate, owner_id, "ai_recommendation", action)
                .with_resource_id(recommendation_id),
        );
    }
}
