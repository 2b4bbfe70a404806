//! Error types for searchbot.

use crate::ids::IdError;

/// Result type for searchbot core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while validating domain input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    /// Gift card code does not match the issued format.
    #[error("invalid gift card code: {reason}")]
    InvalidCode {
        /// Why the code was rejected.
        reason: String,
    },

    /// Amount or count outside the accepted range.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}
