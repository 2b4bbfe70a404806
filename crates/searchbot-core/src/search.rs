//! Search records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{SearchId, TelegramId};

/// One search run by a user.
///
/// Immutable once created, except for the unlock flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Search {
    /// Row identifier.
    pub id: i64,

    /// The user who ran the search.
    pub telegram_id: TelegramId,

    /// Generated search identifier.
    pub search_id: SearchId,

    /// Number of results found.
    pub results_count: i32,

    /// Whether the results were paid for and revealed.
    pub is_unlocked: bool,

    /// When the search was run.
    pub created_at: DateTime<Utc>,
}

/// Input for recording a search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSearch {
    /// The user who ran the search.
    pub telegram_id: TelegramId,

    /// Generated search identifier.
    pub search_id: SearchId,

    /// Number of results found.
    pub results_count: i32,
}

impl NewSearch {
    /// Record a search with a freshly generated identifier.
    #[must_use]
    pub fn new(telegram_id: TelegramId, results_count: i32) -> Self {
        Self {
            telegram_id,
            search_id: SearchId::generate(),
            results_count,
        }
    }
}
