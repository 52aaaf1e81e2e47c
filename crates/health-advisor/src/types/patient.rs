//! Patient-side records read as context for generation

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Gender as recorded on the subject profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
    PreferNotToSay,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
            Gender::PreferNotToSay => "prefer_not_to_say",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "male" => Some(Gender::Male),
            "female" => Some(Gender::Female),
            "other" => Some(Gender::Other),
            "prefer_not_to_say" => Some(Gender::PreferNotToSay),
            _ => None,
        }
    }
}

/// The family member whose health data is analyzed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subject {
    pub id: i64,
    /// Account that owns this subject
    pub owner_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: Option<Gender>,
    /// Free-text list of known conditions
    pub medical_conditions: Option<String>,
}

impl Subject {
    /// Build an unsaved subject; `id` is assigned by the store
    pub fn new(owner_id: i64, first_name: &str, last_name: &str, date_of_birth: NaiveDate) -> Self {
        Self {
            id: 0,
            owner_id,
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            date_of_birth,
            gender: None,
            medical_conditions: None,
        }
    }

    pub fn with_gender(mut self, gender: Gender) -> Self {
        self.gender = Some(gender);
        self
    }

    pub fn with_conditions(mut self, conditions: &str) -> Self {
        self.medical_conditions = Some(conditions.to_string());
        self
    }
}

/// Medication or supplement the subject takes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Medication {
    pub id: i64,
    pub subject_id: i64,
    pub name: String,
    pub dosage: String,
    pub is_active: bool,
}

impl Medication {
    pub fn new(subject_id: i64, name: &str, dosage: &str) -> Self {
        Self {
            id: 0,
            subject_id,
            name: name.to_string(),
            dosage: dosage.to_string(),
            is_active: true,
        }
    }

    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }

    /// Context descriptor: `"name (dosage)"`
    pub fn describe(&self) -> String {
        format!("{} ({})", self.name, self.dosage)
    }
}

/// Interpretation of a lab value against its reference range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabStatus {
    Normal,
    Low,
    High,
    CriticalLow,
    CriticalHigh,
    Abnormal,
    Pending,
}

impl LabStatus {
    /// Statuses surfaced to the model as patient context
    pub const CONTEXT_ABNORMAL: [LabStatus; 4] = [
        LabStatus::Low,
        LabStatus::High,
        LabStatus::CriticalLow,
        LabStatus::CriticalHigh,
    ];

    /// Statuses considered by the rule-based fallback
    pub const RULE_CANDIDATES: [LabStatus; 2] = [LabStatus::Low, LabStatus::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            LabStatus::Normal => "normal",
            LabStatus::Low => "low",
            LabStatus::High => "high",
            LabStatus::CriticalLow => "critical_low",
            LabStatus::CriticalHigh => "critical_high",
            LabStatus::Abnormal => "abnormal",
            LabStatus::Pending => "pending",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "normal" => LabStatus::Normal,
            "low" => LabStatus::Low,
            "high" => LabStatus::High,
            "critical_low" => LabStatus::CriticalLow,
            "critical_high" => LabStatus::CriticalHigh,
            "abnormal" => LabStatus::Abnormal,
            _ => LabStatus::Pending,
        }
    }

    pub fn is_abnormal(&self) -> bool {
        !matches!(self, LabStatus::Normal | LabStatus::Pending)
    }
}

/// A single lab test result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabResult {
    pub id: i64,
    pub subject_id: i64,
    pub test_name: String,
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub reference_range_low: Option<f64>,
    pub reference_range_high: Option<f64>,
    pub status: LabStatus,
    pub test_date: DateTime<Utc>,
}

impl LabResult {
    pub fn new(subject_id: i64, test_name: &str, status: LabStatus, test_date: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            subject_id,
            test_name: test_name.to_string(),
            value: None,
            unit: None,
            reference_range_low: None,
            reference_range_high: None,
            status,
            test_date,
        }
    }

    pub fn with_value(mut self, value: f64, unit: &str) -> Self {
        self.value = Some(value);
        self.unit = Some(unit.to_string());
        self
    }

    pub fn with_reference_range(mut self, low: f64, high: f64) -> Self {
        self.reference_range_low = Some(low);
        self.reference_range_high = Some(high);
        self
    }

    /// Context descriptor:
    /// `"<name>: <value> <unit> (ref: <low>-<high>, status: <status>)"`
    pub fn describe(&self) -> String {
        format!(
            "{}: {} {} (ref: {}-{}, status: {})",
            self.test_name,
            fmt_number(self.value),
            self.unit.as_deref().unwrap_or(""),
            fmt_number(self.reference_range_low),
            fmt_number(self.reference_range_high),
            self.status.as_str()
        )
    }
}

fn fmt_number(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "N/A".to_string())
}

/// A logged food item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DietEntry {
    pub id: i64,
    pub subject_id: i64,
    pub food_name: String,
    pub entry_date: DateTime<Utc>,
}

impl DietEntry {
    pub fn new(subject_id: i64, food_name: &str, entry_date: DateTime<Utc>) -> Self {
        Self {
            id: 0,
            subject_id,
            food_name: food_name.to_string(),
            entry_date,
        }
    }
}

/// Flat per-call snapshot of a subject's health data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PatientContext {
    pub age: Option<i32>,
    pub gender: String,
    /// `"name (dosage)"` for each active medication
    pub medications: Vec<String>,
    /// Most recent first, at most 10
    pub abnormal_labs: Vec<String>,
    pub conditions: String,
    /// Comma-joined food names
    pub diet_summary: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_lab_describe() {
        let lab = LabResult::new(
            1,
            "Vitamin D",
            LabStatus::Low,
            Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
        )
        .with_value(18.5, "ng/mL")
        .with_reference_range(30.0, 100.0);

        assert_eq!(
            lab.describe(),
            "Vitamin D: 18.5 ng/mL (ref: 30-100, status: low)"
        );
    }

    #[test]
    fn test_lab_describe_missing_values() {
        let lab = LabResult::new(
            1,
            "Ferritin",
            LabStatus::CriticalLow,
            Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap(),
        );

        assert_eq!(
            lab.describe(),
            "Ferritin: N/A  (ref: N/A-N/A, status: critical_low)"
        );
    }

    #[test]
    fn test_status_round_trip_and_abnormal() {
        for status in LabStatus::CONTEXT_ABNORMAL {
            assert_eq!(LabStatus::parse(status.as_str()), status);
            assert!(status.is_abnormal());
        }
        assert!(!LabStatus::Normal.is_abnormal());
        assert_eq!(LabStatus::parse("garbage"), LabStatus::Pending);
    }
}
