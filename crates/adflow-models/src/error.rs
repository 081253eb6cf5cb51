//! Model error types.

use thiserror::Error;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("Unknown job kind: {0}")]
    UnknownJobKind(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Scene not found: {0}")]
    SceneNotFound(String),

    #[error("Validation failed: {0}")]
    Validation(#[from] validator::ValidationErrors),
}
