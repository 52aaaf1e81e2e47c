//! Recommendation entity and its feedback fields

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Fixed advisory text stored on every recommendation
pub const DISCLAIMER: &str = "This is an AI-generated suggestion. Please consult with your healthcare provider before making any changes to your diet, supplements, or medications.";

/// Kind of recommendation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationType {
    Supplement,
    Dietary,
    Lifestyle,
    MedicationInteraction,
    LabFollowup,
    GeneralHealth,
}

impl RecommendationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecommendationType::Supplement => "supplement",
            RecommendationType::Dietary => "dietary",
            RecommendationType::Lifestyle => "lifestyle",
            RecommendationType::MedicationInteraction => "medication_interaction",
            RecommendationType::LabFollowup => "lab_followup",
            RecommendationType::GeneralHealth => "general_health",
        }
    }

    /// Map a free-form label; anything unrecognized is a supplement
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "dietary" => RecommendationType::Dietary,
            "lifestyle" => RecommendationType::Lifestyle,
            "medication_interaction" => RecommendationType::MedicationInteraction,
            "lab_followup" => RecommendationType::LabFollowup,
            "general_health" => RecommendationType::GeneralHealth,
            _ => RecommendationType::Supplement,
        }
    }
}

/// Recommendation urgency
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
    Informational,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
            Priority::Informational => "informational",
        }
    }

    /// Map a free-form label; anything unrecognized is medium
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "high" => Priority::High,
            "low" => Priority::Low,
            "informational" => Priority::Informational,
            _ => Priority::Medium,
        }
    }

    /// Sort key, most urgent first
    pub fn rank(&self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
            Priority::Informational => 3,
        }
    }
}

/// Content of a recommendation before it is persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRecommendation {
    pub subject_id: i64,
    pub recommendation_type: RecommendationType,
    pub priority: Priority,
    pub title: String,
    pub description: String,
    pub detailed_explanation: Option<String>,
    pub supplement_name: Option<String>,
    pub suggested_dosage: Option<String>,
    pub frequency: Option<String>,
    pub foods_to_include: Vec<String>,
    pub foods_to_avoid: Vec<String>,
    pub triggered_by_lab_id: Option<i64>,
    pub triggered_by_medication_id: Option<i64>,
    pub model_used: String,
    pub confidence_score: Option<f64>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Persisted recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: i64,
    pub subject_id: i64,
    pub recommendation_type: RecommendationType,
    pub priority: Priority,
    pub title: String,
    pub description: String,
    pub detailed_explanation: Option<String>,
    pub supplement_name: Option<String>,
    pub suggested_dosage: Option<String>,
    pub frequency: Option<String>,
    pub foods_to_include: Vec<String>,
    pub foods_to_avoid: Vec<String>,
    pub triggered_by_lab_id: Option<i64>,
    pub triggered_by_medication_id: Option<i64>,
    pub model_used: String,
    pub confidence_score: Option<f64>,
    pub is_active: bool,
    pub is_acknowledged: bool,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub user_rating: Option<u8>,
    pub user_feedback: Option<String>,
    pub is_followed: Option<bool>,
    pub disclaimer: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// User feedback supplied when acknowledging a recommendation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    #[serde(default, alias = "rating")]
    pub user_rating: Option<u8>,
    #[serde(default, alias = "feedback")]
    pub user_feedback: Option<String>,
    #[serde(default)]
    pub is_followed: Option<bool>,
}

impl Feedback {
    pub fn rating(rating: u8) -> Self {
        Self {
            user_rating: Some(rating),
            ..Default::default()
        }
    }

    pub fn comment(text: &str) -> Self {
        Self {
            user_feedback: Some(text.to_string()),
            ..Default::default()
        }
    }

    /// Ratings are 1-5 stars
    pub fn validate(&self) -> Result<()> {
        match self.user_rating {
            Some(r) if !(1..=5).contains(&r) => Err(Error::validation(format!(
                "user_rating must be between 1 and 5, got {}",
                r
            ))),
            _ => Ok(()),
        }
    }
}

/// Field changes applied by the feedback lifecycle; `None` leaves a column untouched
#[derive(Debug, Clone, PartialEq)]
pub struct RecommendationUpdate {
    pub is_active: Option<bool>,
    pub is_acknowledged: Option<bool>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub user_rating: Option<u8>,
    pub user_feedback: Option<String>,
    pub is_followed: Option<bool>,
    pub updated_at: DateTime<Utc>,
}

impl RecommendationUpdate {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            is_active: None,
            is_acknowledged: None,
            acknowledged_at: None,
            user_rating: None,
            user_feedback: None,
            is_followed: None,
            updated_at: now,
        }
    }
}

/// What the caller wants generated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationRequest {
    #[serde(default = "default_true")]
    pub include_supplements: bool,
    #[serde(default = "default_true")]
    pub include_dietary: bool,
    /// e.g. `["vitamin_deficiency", "heart_health"]`
    #[serde(default)]
    pub focus_areas: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl Default for RecommendationRequest {
    fn default() -> Self {
        Self {
            include_supplements: true,
            include_dietary: true,
            focus_areas: Vec::new(),
        }
    }
}
