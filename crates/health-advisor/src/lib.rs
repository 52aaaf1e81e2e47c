//! health-advisor: health recommendations and chat over a subject's stored data
//!
//! Recommendations come from a pluggable language model (a local
//! Ollama-compatible server or a dedicated Vertex AI endpoint). When the model
//! cannot be reached a keyword rule table over low lab results takes over.
//! Persisted recommendations are acknowledged or dismissed through
//! [`feedback::FeedbackLifecycle`], and every access to health data is
//! reported to an [`audit::AuditSink`].

pub mod audit;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod feedback;
pub mod generation;
pub mod providers;
pub mod server;
pub mod storage;
pub mod types;

pub use config::AdvisorConfig;
pub use engine::AdvisorEngine;
pub use error::{Error, Result};
pub use types::{
    chat::{ChatReply, ChatTurn},
    patient::PatientContext,
    recommendation::{Feedback, Recommendation, RecommendationRequest},
};
