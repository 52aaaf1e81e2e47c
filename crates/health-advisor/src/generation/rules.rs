//! Deterministic fallback recommendations keyed on lab test names

use crate::types::{LabResult, LabStatus, NewRecommendation, Priority, RecommendationType};

/// Model identifier recorded on rule output
pub const RULE_MODEL_ID: &str = "rule_based";

/// Confidence recorded on rule output
pub const RULE_CONFIDENCE: f64 = 0.9;

/// One keyword rule and the recommendation it produces
#[derive(Debug)]
pub struct RuleDefinition {
    /// Lower-case substring matched against the test name
    pub keyword: &'static str,
    /// Status the lab must have for the rule to fire
    pub required_status: LabStatus,
    pub recommendation_type: RecommendationType,
    pub priority: Priority,
    pub title: &'static str,
    pub description: &'static str,
    pub supplement_name: Option<&'static str>,
    pub dosage: Option<&'static str>,
    pub foods_to_include: &'static [&'static str],
    pub foods_to_avoid: &'static [&'static str],
}

/// Rules in match order; the first matching keyword wins
pub static RULES: &[RuleDefinition] = &[
    RuleDefinition {
        keyword: "vitamin b12",
        required_status: LabStatus::Low,
        recommendation_type: RecommendationType::Supplement,
        priority: Priority::High,
        title: "Vitamin B12 Supplementation Recommended",
        description: "Your B12 levels are below the normal range. Consider B12 supplementation.",
        supplement_name: Some("Vitamin B12 (Methylcobalamin)"),
        dosage: Some("1000-2000 mcg daily"),
        foods_to_include: &["beef liver", "clams", "fish", "fortified cereals", "eggs", "dairy"],
        foods_to_avoid: &[],
    },
    RuleDefinition {
        keyword: "vitamin d",
        required_status: LabStatus::Low,
        recommendation_type: RecommendationType::Supplement,
        priority: Priority::High,
        title: "Vitamin D Supplementation Recommended",
        description: "Your Vitamin D levels are low. Consider supplementation and sun exposure.",
        supplement_name: Some("Vitamin D3"),
        dosage: Some("1000-4000 IU daily"),
        foods_to_include: &["fatty fish", "fortified milk", "egg yolks", "mushrooms"],
        foods_to_avoid: &[],
    },
    RuleDefinition {
        keyword: "iron",
        required_status: LabStatus::Low,
        recommendation_type: RecommendationType::Supplement,
        priority: Priority::High,
        title: "Iron Supplementation May Be Needed",
        description: "Your iron levels are below normal. Consider iron-rich foods and possible supplementation.",
        supplement_name: Some("Iron (Ferrous Sulfate)"),
        dosage: Some("18-27 mg daily with Vitamin C"),
        foods_to_include: &["red meat", "spinach", "lentils", "fortified cereals", "beans"],
        foods_to_avoid: &["coffee and tea with meals", "calcium-rich foods with iron supplements"],
    },
    RuleDefinition {
        keyword: "hemoglobin",
        required_status: LabStatus::Low,
        recommendation_type: RecommendationType::Dietary,
        priority: Priority::High,
        title: "Dietary Changes for Hemoglobin",
        description: "Low hemoglobin may indicate anemia. Focus on iron and B12 rich foods.",
        supplement_name: None,
        dosage: None,
        foods_to_include: &["red meat", "dark leafy greens", "beans", "fortified cereals"],
        foods_to_avoid: &[],
    },
    RuleDefinition {
        keyword: "glucose",
        required_status: LabStatus::Low,
        recommendation_type: RecommendationType::Dietary,
        priority: Priority::High,
        title: "Blood Sugar Management",
        description: "Your glucose levels need attention. Consider dietary modifications.",
        supplement_name: None,
        dosage: None,
        foods_to_include: &["whole grains", "vegetables", "lean proteins", "legumes"],
        foods_to_avoid: &["sugary drinks", "white bread", "processed foods", "candy"],
    },
    // Written for elevated cholesterol but, like every rule here, only fires on LOW
    RuleDefinition {
        keyword: "cholesterol",
        required_status: LabStatus::Low,
        recommendation_type: RecommendationType::Dietary,
        priority: Priority::Medium,
        title: "Heart-Healthy Diet Recommended",
        description: "Your cholesterol levels are elevated. Consider heart-healthy dietary changes.",
        supplement_name: Some("Omega-3 Fish Oil"),
        dosage: Some("1000-2000 mg daily"),
        foods_to_include: &["fatty fish", "nuts", "olive oil", "oats", "beans"],
        foods_to_avoid: &["fried foods", "red meat", "full-fat dairy", "processed meats"],
    },
];

impl RuleDefinition {
    fn matches(&self, lab: &LabResult) -> bool {
        lab.test_name.to_lowercase().contains(self.keyword) && lab.status == self.required_status
    }

    fn instantiate(&self, subject_id: i64, lab: &LabResult) -> NewRecommendation {
        NewRecommendation {
            subject_id,
            recommendation_type: self.recommendation_type,
            priority: self.priority,
            title: self.title.to_string(),
            description: self.description.to_string(),
            detailed_explanation: None,
            supplement_name: self.supplement_name.map(String::from),
            suggested_dosage: self.dosage.map(String::from),
            frequency: None,
            foods_to_include: to_strings(self.foods_to_include),
            foods_to_avoid: to_strings(self.foods_to_avoid),
            triggered_by_lab_id: Some(lab.id),
            triggered_by_medication_id: None,
            model_used: RULE_MODEL_ID.to_string(),
            confidence_score: Some(RULE_CONFIDENCE),
            expires_at: None,
        }
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Keyword-driven fallback over a subject's LOW/HIGH labs
pub struct RuleEngine;

impl RuleEngine {
    /// At most one recommendation per lab, in lab order
    pub fn apply(subject_id: i64, labs: &[LabResult]) -> Vec<NewRecommendation> {
        labs.iter()
            .filter_map(|lab| {
                RULES
                    .iter()
                    .find(|rule| rule.matches(lab))
                    .map(|rule| rule.instantiate(subject_id, lab))
            })
            .collect()
    }
}
