//! Parse model output into recommendation entities

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::types::{NewRecommendation, Priority, RecommendationType};

/// Title used when the model omits one
pub const DEFAULT_TITLE: &str = "Health Recommendation";

/// Extract the JSON document embedded in free model text
///
/// Takes everything from the first `{` to the last `}` inclusive. Prose
/// containing stray braces before or after the document defeats this.
pub fn extract_json_document(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    serde_json::from_str(&text[start..=end]).ok()
}

/// Maps a model's recommendation document onto entities
pub struct ResponseParser;

impl ResponseParser {
    /// Parse raw model text; anything unparseable yields an empty list
    pub fn parse(
        raw_text: &str,
        subject_id: i64,
        model_used: &str,
        confidence: Option<f64>,
    ) -> Vec<NewRecommendation> {
        Self::try_parse(raw_text, subject_id, model_used, confidence).unwrap_or_else(|e| {
            tracing::warn!("{} ({} chars of model output)", e, raw_text.len());
            Vec::new()
        })
    }

    /// Parse raw model text, reporting why nothing could be extracted
    pub fn try_parse(
        raw_text: &str,
        subject_id: i64,
        model_used: &str,
        confidence: Option<f64>,
    ) -> Result<Vec<NewRecommendation>> {
        let document = extract_json_document(raw_text)
            .ok_or_else(|| Error::MalformedModelOutput("no JSON document found".to_string()))?;

        let items = document
            .get("recommendations")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                Error::MalformedModelOutput("missing recommendations array".to_string())
            })?;

        Ok(items
            .iter()
            .filter_map(Value::as_object)
            .map(|item| Self::parse_item(item, subject_id, model_used, confidence))
            .collect())
    }

    fn parse_item(
        item: &Map<String, Value>,
        subject_id: i64,
        model_used: &str,
        confidence: Option<f64>,
    ) -> NewRecommendation {
        NewRecommendation {
            subject_id,
            recommendation_type: RecommendationType::from_label(
                str_field(item, "type").unwrap_or_default(),
            ),
            priority: Priority::from_label(str_field(item, "priority").unwrap_or_default()),
            title: str_field(item, "title").unwrap_or(DEFAULT_TITLE).to_string(),
            description: str_field(item, "description").unwrap_or_default().to_string(),
            detailed_explanation: Some(str_field(item, "reasoning").unwrap_or_default().to_string()),
            supplement_name: str_field(item, "supplement_name").map(String::from),
            suggested_dosage: str_field(item, "dosage").map(String::from),
            frequency: str_field(item, "frequency").map(String::from),
            foods_to_include: list_field(item, "foods_to_include"),
            foods_to_avoid: list_field(item, "foods_to_avoid"),
            triggered_by_lab_id: None,
            triggered_by_medication_id: None,
            model_used: model_used.to_string(),
            confidence_score: confidence,
            expires_at: None,
        }
    }
}

fn str_field<'a>(item: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    item.get(key).and_then(Value::as_str)
}

fn list_field(item: &Map<String, Value>, key: &str) -> Vec<String> {
    item.get(key)
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}
