//! Data-model error types.

use thiserror::Error;

/// Errors raised while decoding or validating user input.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed topology bytes.
    #[error("invalid topology format: {0}")]
    InvalidFormat(String),

    /// Malformed or inconsistent deployment description.
    #[error("invalid deployment description: {0}")]
    InvalidDescription(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
