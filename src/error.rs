//! Error types for the scoring pipeline
//!
//! Encoder and explainer failures are terminal for a single prediction
//! request. Notification failures live in `notify::SendError` and never
//! surface here.

use thiserror::Error;

/// Errors that can occur while encoding, scoring or explaining a customer
#[derive(Error, Debug)]
pub enum ChurnError {
    #[error("Missing required field '{field}'")]
    MissingField { field: String },

    #[error("Invalid value for field '{field}': {reason}")]
    InvalidField { field: String, reason: String },

    #[error("Feature schema does not match the model: {0}")]
    SchemaMismatch(String),

    #[error("Model '{kind}' does not support attribution: {reason}")]
    UnsupportedModel { kind: String, reason: String },

    #[error("Failed to load model: {0}")]
    ModelLoad(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ChurnError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        ChurnError::InvalidField {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// True when the error only means "no explanation available"
    pub fn is_unsupported_model(&self) -> bool {
        matches!(self, ChurnError::UnsupportedModel { .. })
    }
}

pub type ChurnResult<T> = Result<T, ChurnError>;
