//! User types for searchbot.
//!
//! A user row is created on the first interaction with the bot and carries the
//! two search allowances.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::TelegramId;

/// Free searches granted to every new user.
pub const DEFAULT_FREE_SEARCHES: i32 = 1;

/// Paid searches a new user starts with.
pub const DEFAULT_PAID_SEARCHES: i32 = 0;

/// A bot user and their search allowances.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Row identifier.
    pub id: i64,

    /// Platform-assigned identifier (unique).
    pub telegram_id: TelegramId,

    /// Display name, if the platform provided one.
    pub username: Option<String>,

    /// Remaining free searches.
    pub free_searches: i32,

    /// Remaining paid searches.
    pub paid_searches: i32,

    /// When the user first interacted with the bot.
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Total searches the user can still run.
    #[must_use]
    pub const fn total_searches(&self) -> i32 {
        self.free_searches + self.paid_searches
    }

    /// Check if the user has at least one search left.
    #[must_use]
    pub const fn has_searches(&self) -> bool {
        self.free_searches > 0 || self.paid_searches > 0
    }

    /// The allowance the next search would be charged to.
    #[must_use]
    pub const fn next_allowance(&self) -> Option<AllowanceKind> {
        if self.free_searches > 0 {
            Some(AllowanceKind::Free)
        } else if self.paid_searches > 0 {
            Some(AllowanceKind::Paid)
        } else {
            None
        }
    }
}

/// Input for creating a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUser {
    /// Platform-assigned identifier.
    pub telegram_id: TelegramId,

    /// Display name.
    pub username: Option<String>,
}

impl NewUser {
    /// Create user input with no display name.
    #[must_use]
    pub const fn new(telegram_id: TelegramId) -> Self {
        Self {
            telegram_id,
            username: None,
        }
    }

    /// Set the display name.
    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

/// Which allowance a search was charged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowanceKind {
    /// One of the free searches.
    Free,

    /// A purchased or gifted search.
    Paid,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(free: i32, paid: i32) -> User {
        User {
            id: 1,
            telegram_id: TelegramId::new(42),
            username: None,
            free_searches: free,
            paid_searches: paid,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn free_allowance_spent_first() {
        assert_eq!(user(1, 3).next_allowance(), Some(AllowanceKind::Free));
        assert_eq!(user(0, 3).next_allowance(), Some(AllowanceKind::Paid));
        assert_eq!(user(0, 0).next_allowance(), None);
    }

    #[test]
    fn totals() {
        let u = user(1, 4);
        assert_eq!(u.total_searches(), 5);
        assert!(u.has_searches());
        assert!(!user(0, 0).has_searches());
    }

    #[test]
    fn new_user_builder() {
        let input = NewUser::new(TelegramId::new(7)).with_username("alice");
        assert_eq!(input.username.as_deref(), Some("alice"));
    }
}
