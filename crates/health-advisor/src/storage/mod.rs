//! Storage module for subject health data and recommendations
//!
//! The engine reads subjects, medications, labs and diet through
//! `HealthStore` and persists recommendations through it. SQLite backs the
//! default implementation.

mod database;

pub use database::SqliteHealthStore;

use crate::error::Result;
use crate::types::{
    DietEntry, LabResult, LabStatus, Medication, NewRecommendation, Recommendation,
    RecommendationUpdate, Subject,
};

/// Health data collaborator
///
/// Calls are synchronous and short; implementations must not block on
/// anything slower than local storage.
pub trait HealthStore: Send + Sync {
    /// Subject `subject_id` if it belongs to `owner_id`
    fn load_subject(&self, subject_id: i64, owner_id: i64) -> Result<Option<Subject>>;

    /// Active medications in insertion order
    fn list_active_medications(&self, subject_id: i64) -> Result<Vec<Medication>>;

    /// Labs with one of `statuses`, newest test date first
    fn list_labs_by_status(
        &self,
        subject_id: i64,
        statuses: &[LabStatus],
        limit: Option<usize>,
    ) -> Result<Vec<LabResult>>;

    /// Diet entries, newest first
    fn list_recent_diet_entries(&self, subject_id: i64, limit: usize) -> Result<Vec<DietEntry>>;

    /// Persist a batch atomically and return the stored entities in batch order
    fn insert_recommendations(&self, batch: &[NewRecommendation]) -> Result<Vec<Recommendation>>;

    fn get_recommendation(&self, id: i64) -> Result<Option<Recommendation>>;

    /// Ordered by priority (high first), then newest first
    fn list_recommendations(&self, subject_id: i64, active_only: bool)
        -> Result<Vec<Recommendation>>;

    /// Apply the non-`None` fields of `update`; `None` if the row is absent
    fn update_recommendation(
        &self,
        id: i64,
        update: &RecommendationUpdate,
    ) -> Result<Option<Recommendation>>;
}
