//! Error types for infrastructure ports.

use thiserror::Error;

/// Errors from the model-calling substrate. These are infrastructure
/// faults: unlike malformed model *output*, they fail the turn.
#[derive(Debug, Error, Clone)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid LLM response: {0}")]
    InvalidResponse(String),
}

/// Errors from the session/package store.
#[derive(Debug, Error, Clone)]
pub enum StoreError {
    #[error("Not found: {entity} '{id}'")]
    NotFound { entity: &'static str, id: String },

    #[error("Storage failure: {0}")]
    Backend(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }
}
