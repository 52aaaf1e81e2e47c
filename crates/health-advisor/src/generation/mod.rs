//! Recommendation generation and chat with model output handling

pub mod chat;
pub mod orchestrator;
pub mod parser;
pub mod prompt;
pub mod rules;

pub use chat::ChatOrchestrator;
pub use orchestrator::GenerationOrchestrator;
pub use parser::{extract_json_document, ResponseParser};
pub use prompt::PromptBuilder;
pub use rules::{RuleDefinition, RuleEngine, RULES};
