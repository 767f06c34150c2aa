//! Parse errors for the on-disk formats.

use thiserror::Error;

/// Result type for model parsing.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors raised while parsing analysis lines and frame names.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("Malformed analysis line: {0:?}")]
    MalformedAnalysisLine(String),

    #[error("Invalid face coordinate {value:?} in analysis line")]
    InvalidCoordinate { value: String },

    #[error("Not an adjusted frame name: {0:?}")]
    InvalidFrameName(String),

    #[error("Mouth ratio out of range: {0}")]
    RatioOutOfRange(i64),
}
