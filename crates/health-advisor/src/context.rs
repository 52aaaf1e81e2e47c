//! Patient context assembly from stored health data

use chrono::{Datelike, NaiveDate, Utc};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::storage::HealthStore;
use crate::types::{LabStatus, PatientContext, Subject};

/// Abnormal labs carried into the context
pub const MAX_CONTEXT_LABS: usize = 10;

/// Diet entries fetched per call
pub const DIET_FETCH_LIMIT: usize = 20;

/// Food names folded into the diet summary
pub const DIET_SUMMARY_ITEMS: usize = 10;

/// Builds the per-call `PatientContext` snapshot
pub struct PatientContextAssembler {
    store: Arc<dyn HealthStore>,
}

impl PatientContextAssembler {
    pub fn new(store: Arc<dyn HealthStore>) -> Self {
        Self { store }
    }

    /// Assemble context as of today
    pub fn assemble(&self, subject_id: i64, owner_id: i64) -> Result<PatientContext> {
        self.assemble_on(subject_id, owner_id, Utc::now().date_naive())
    }

    /// Assemble context with an explicit reference date for the age
    pub fn assemble_on(
        &self,
        subject_id: i64,
        owner_id: i64,
        today: NaiveDate,
    ) -> Result<PatientContext> {
        let subject = self
            .store
            .load_subject(subject_id, owner_id)?
            .ok_or(Error::AccessDenied(subject_id))?;

        let medications = self
            .store
            .list_active_medications(subject_id)?
            .iter()
            .map(|m| m.describe())
            .collect();

        let abnormal_labs = self
            .store
            .list_labs_by_status(subject_id, &LabStatus::CONTEXT_ABNORMAL, Some(MAX_CONTEXT_LABS))?
            .iter()
            .map(|l| l.describe())
            .collect();

        let diet_summary = self
            .store
            .list_recent_diet_entries(subject_id, DIET_FETCH_LIMIT)?
            .iter()
            .take(DIET_SUMMARY_ITEMS)
            .map(|d| d.food_name.as_str())
            .collect::<Vec<_>>()
            .join(", ");

        Ok(PatientContext {
            age: Some(naive_age(&subject, today)),
            gender: subject
                .gender
                .map(|g| g.as_str().to_string())
                .unwrap_or_else(|| "Unknown".to_string()),
            medications,
            abnormal_labs,
            conditions: subject.medical_conditions.unwrap_or_default(),
            diet_summary,
        })
    }
}

/// Year difference only; ignores whether the birthday has passed
fn naive_age(subject: &Subject, today: NaiveDate) -> i32 {
    today.year() - subject.date_of_birth.year()
}
