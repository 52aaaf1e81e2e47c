//! Prompt templates for recommendation generation and chat

use crate::types::{ChatTurn, PatientContext, RecommendationRequest};

/// Advisory block opening every prompt
const DISCLAIMER_BLOCK: &str = "IMPORTANT DISCLAIMER: These are suggestions only. Always consult with a healthcare provider before making any changes to diet, supplements, or medications.";

/// Marker line standing in for an attached image
pub const IMAGE_MARKER: &str =
    "[An image has been provided for analysis - this could be an X-ray, lab result, or medical document]";

/// Chat history turns carried into the prompt
pub const MAX_HISTORY_TURNS: usize = 5;

/// Prompt builder for the advisor
pub struct PromptBuilder;

impl PromptBuilder {
    /// Build the request sentence list from the caller's generation options
    pub fn build_request_text(request: &RecommendationRequest) -> String {
        let mut parts = vec![
            "Analyze the patient's health data and provide recommendations.".to_string(),
        ];

        if !request.focus_areas.is_empty() {
            parts.push(format!("Focus on: {}", request.focus_areas.join(", ")));
        }

        if request.include_supplements {
            parts.push(
                "Include supplement recommendations for any deficiencies found in lab results."
                    .to_string(),
            );
        }

        if request.include_dietary {
            parts.push(
                "Include dietary recommendations to address health concerns.".to_string(),
            );
        }

        parts.join(" ")
    }

    /// Build the generation prompt with its strict JSON output contract
    pub fn build_generation_prompt(request_text: &str, context: &PatientContext) -> String {
        format!(
            r#"You are a medical AI assistant helping to provide health recommendations.

{disclaimer}

{context}

Request: {request}

Please provide:
1. Specific supplement recommendations if applicable
2. Dietary suggestions
3. Foods to include and avoid
4. Any potential interactions to be aware of

Format your response as JSON with the following structure:
{{
    "recommendations": [
        {{
            "type": "supplement|dietary|lifestyle",
            "priority": "high|medium|low",
            "title": "Brief title",
            "description": "Detailed description",
            "supplement_name": "If applicable",
            "dosage": "If applicable",
            "foods_to_include": ["list of foods"],
            "foods_to_avoid": ["list of foods"],
            "reasoning": "Why this is recommended"
        }}
    ]
}}
"#,
            disclaimer = DISCLAIMER_BLOCK,
            context = Self::format_context(context),
            request = request_text,
        )
    }

    /// Build a free-form chat prompt with recent history
    pub fn build_chat_prompt(
        message: &str,
        context: &PatientContext,
        history: &[ChatTurn],
        has_image: bool,
    ) -> String {
        let mut parts = vec![
            "You are MedGemma, a medical AI assistant. Provide helpful, accurate health information.".to_string(),
            String::new(),
            DISCLAIMER_BLOCK.to_string(),
            String::new(),
            Self::format_context(context),
            String::new(),
        ];

        if !history.is_empty() {
            parts.push("Previous conversation:".to_string());
            let start = history.len().saturating_sub(MAX_HISTORY_TURNS);
            for turn in &history[start..] {
                parts.push(format!("{}: {}", turn.role.label(), turn.content));
            }
            parts.push(String::new());
        }

        if has_image {
            parts.push(IMAGE_MARKER.to_string());
            parts.push(String::new());
        }

        parts.push(format!("User: {}", message));
        parts.push(String::new());
        parts.push("Please provide a helpful, medically-informed response:".to_string());

        parts.join("\n")
    }

    /// Patient context block shared by both prompts
    fn format_context(context: &PatientContext) -> String {
        let age = context
            .age
            .map(|a| a.to_string())
            .unwrap_or_else(|| "Unknown".to_string());

        let medications = if context.medications.is_empty() {
            "None".to_string()
        } else {
            context.medications.join(", ")
        };

        let labs = if context.abnormal_labs.is_empty() {
            "None available".to_string()
        } else {
            context.abnormal_labs.join("\n")
        };

        format!(
            "Patient Context:\n- Age: {}\n- Gender: {}\n- Current Medications: {}\n- Recent Lab Results: {}\n- Known Conditions: {}\n- Recent Diet: {}",
            age,
            or_default(&context.gender, "Unknown"),
            medications,
            labs,
            or_default(&context.conditions, "None listed"),
            or_default(&context.diet_summary, "Not tracked"),
        )
    }
}

fn or_default<'a>(value: &'a str, fallback: &'a str) -> &'a str {
    if value.trim().is_empty() {
        fallback
    } else {
        value
    }
}
