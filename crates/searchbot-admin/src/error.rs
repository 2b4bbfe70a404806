//! Admin tool error types.

use searchbot_core::CoreError;
use searchbot_store::StoreError;

/// Result type for admin operations.
pub type Result<T> = std::result::Result<T, AdminError>;

/// Errors surfaced by the admin commands.
#[derive(Debug, thiserror::Error)]
pub enum AdminError {
    /// Missing or malformed configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Input rejected by validation.
    #[error(transparent)]
    Invalid(#[from] CoreError),

    /// CSV read or write failed.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// File system error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An import file has no code column.
    #[error("{path}: no Code column in header")]
    MissingCodeColumn {
        /// The file read.
        path: String,
    },

    /// A unique code could not be generated.
    #[error("gave up generating a unique code after {attempts} attempts")]
    CodeExhausted {
        /// Attempts made.
        attempts: u32,
    },
}
