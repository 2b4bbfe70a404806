//! Identifier types for searchbot.
//!
//! Users are keyed everywhere by the numeric identifier the messaging platform
//! assigns them. Searches carry a generated string identifier so that a result
//! can be unlocked later without exposing the row id.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A platform-issued numeric user identifier.
///
/// This is the foreign key target for every other table.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TelegramId(i64);

impl TelegramId {
    /// Wrap a raw platform identifier.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Return the raw identifier.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for TelegramId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<TelegramId> for i64 {
    fn from(id: TelegramId) -> Self {
        id.0
    }
}

impl FromStr for TelegramId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|_| IdError::InvalidTelegramId(s.to_string()))
    }
}

impl fmt::Debug for TelegramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TelegramId({})", self.0)
    }
}

impl fmt::Display for TelegramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A generated search identifier.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SearchId(String);

impl SearchId {
    /// Generate a new random search identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Borrow the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for SearchId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(IdError::EmptySearchId);
        }
        Ok(Self(s.to_string()))
    }
}

impl fmt::Debug for SearchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SearchId({})", self.0)
    }
}

impl fmt::Display for SearchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SearchId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SearchId> for String {
    fn from(id: SearchId) -> Self {
        id.0
    }
}

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The input is not a 64-bit integer.
    #[error("invalid telegram id: {0:?}")]
    InvalidTelegramId(String),

    /// Search identifiers must not be empty.
    #[error("search id must not be empty")]
    EmptySearchId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn telegram_id_parses_with_whitespace() {
        let id: TelegramId = " 42 ".parse().unwrap();
        assert_eq!(id.get(), 42);
        assert_eq!(id.to_string(), "42");
    }

    #[test]
    fn telegram_id_rejects_garbage() {
        assert!(matches!(
            "forty-two".parse::<TelegramId>(),
            Err(IdError::InvalidTelegramId(_))
        ));
    }

    #[test]
    fn telegram_id_serializes_as_number() {
        let json = serde_json::to_string(&TelegramId::new(42)).unwrap();
        assert_eq!(json, "42");
    }

    #[test]
    fn generated_search_ids_differ() {
        let a = SearchId::generate();
        let b = SearchId::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn empty_search_id_rejected() {
        assert_eq!("  ".parse::<SearchId>(), Err(IdError::EmptySearchId));
        assert!(serde_json::from_str::<SearchId>("\"\"").is_err());
    }
}
