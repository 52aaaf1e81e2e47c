//! Core types for the advisor

pub mod chat;
pub mod patient;
pub mod recommendation;

pub use chat::{ChatReply, ChatRole, ChatTurn};
pub use patient::{DietEntry, Gender, LabResult, LabStatus, Medication, PatientContext, Subject};
pub use recommendation::{
    Feedback, NewRecommendation, Priority, Recommendation, RecommendationRequest,
    RecommendationType, RecommendationUpdate, DISCLAIMER,
};
