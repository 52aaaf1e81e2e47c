//! Google Cloud provider implementation
//!
//! - Dedicated Vertex AI endpoint serving MedGemma
//! - Access tokens from explicit token, service account key, or metadata server

mod auth;
mod medgemma;

pub use auth::{CredentialSource, GcpAuth};
pub use medgemma::{RemoteMedicalModelProvider, REMOTE_CONFIDENCE, REMOTE_MODEL_ID};
