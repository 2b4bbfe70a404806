//! Error types for searchbot storage.

use chrono::{DateTime, Utc};
use searchbot_core::{CoreError, TelegramId};

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Applying migrations failed.
    #[error("migration error: {0}")]
    Migration(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of record.
        entity: &'static str,
        /// The key that was looked up.
        id: String,
    },

    /// Unique constraint violated.
    #[error("conflict on {constraint}")]
    Conflict {
        /// The violated constraint.
        constraint: String,
    },

    /// Foreign key constraint violated.
    #[error("foreign key violation on {constraint}")]
    ForeignKey {
        /// The violated constraint.
        constraint: String,
    },

    /// Not-null, check or trigger constraint violated.
    #[error("constraint violation on {constraint}")]
    Constraint {
        /// The violated constraint.
        constraint: String,
    },

    /// Gift card was redeemed before.
    #[error("gift card {code} already redeemed at {redeemed_at}")]
    AlreadyRedeemed {
        /// The card's raw code.
        code: String,
        /// When it was redeemed.
        redeemed_at: DateTime<Utc>,
    },

    /// Neither free nor paid searches remain.
    #[error("no searches left for user {telegram_id}")]
    InsufficientSearches {
        /// The user.
        telegram_id: TelegramId,
    },

    /// Input rejected before reaching the database.
    #[error(transparent)]
    Invalid(#[from] CoreError),
}

/// Validate a page request, returning `(limit, offset)`.
pub(crate) fn page_bounds(limit: i64, offset: i64) -> Result<(usize, usize)> {
    match (usize::try_from(limit), usize::try_from(offset)) {
        (Ok(limit), Ok(offset)) => Ok((limit, offset)),
        _ => Err(CoreError::InvalidAmount(format!(
            "limit and offset must not be negative, got {limit} and {offset}"
        ))
        .into()),
    }
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Check if this is a unique-key conflict.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        use sqlx::error::ErrorKind;

        match err {
            sqlx::Error::Database(db_err) => {
                let constraint = db_err.constraint().unwrap_or("unknown").to_string();
                match db_err.kind() {
                    ErrorKind::UniqueViolation => Self::Conflict { constraint },
                    ErrorKind::ForeignKeyViolation => Self::ForeignKey { constraint },
                    ErrorKind::NotNullViolation | ErrorKind::CheckViolation => {
                        Self::Constraint { constraint }
                    }
                    _ => Self::Database(db_err.to_string()),
                }
            }
            other => Self::Database(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::Migration(err.to_string())
    }
}
