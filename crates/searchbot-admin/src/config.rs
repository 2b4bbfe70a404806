//! Admin tool configuration.

use std::path::PathBuf;

use crate::error::{AdminError, Result};

/// Configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AdminConfig {
    /// PostgreSQL connection URL (`DATABASE_URL`).
    pub database_url: Option<String>,

    /// Connection pool size (`DATABASE_MAX_CONNECTIONS`, default: 5).
    pub max_connections: u32,

    /// Directory for generated CSV files (`GIFT_CARD_EXPORT_DIR`, default: ".").
    pub export_dir: PathBuf,
}

impl AdminConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            max_connections: lookup("DATABASE_MAX_CONNECTIONS")
                .and_then(|s| s.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_connections),
            export_dir: lookup("GIFT_CARD_EXPORT_DIR")
                .map_or(defaults.export_dir, PathBuf::from),
        }
    }

    /// The database URL, which every command that touches storage needs.
    ///
    /// # Errors
    ///
    /// Returns `AdminError::Config` if `DATABASE_URL` is not set.
    pub fn require_database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .ok_or_else(|| AdminError::Config("DATABASE_URL is not set".to_string()))
    }
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 5,
            export_dir: PathBuf::from("."),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        let config = AdminConfig::from_lookup(lookup(&[]));
        assert!(config.database_url.is_none());
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.export_dir, PathBuf::from("."));
        assert!(matches!(
            config.require_database_url(),
            Err(AdminError::Config(_))
        ));
    }

    #[test]
    fn reads_variables() {
        let config = AdminConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/searchbot"),
            ("DATABASE_MAX_CONNECTIONS", "12"),
            ("GIFT_CARD_EXPORT_DIR", "/tmp/cards"),
        ]));
        assert_eq!(
            config.require_database_url().unwrap(),
            "postgres://localhost/searchbot"
        );
        assert_eq!(config.max_connections, 12);
        assert_eq!(config.export_dir, PathBuf::from("/tmp/cards"));
    }

    #[test]
    fn ignores_bad_pool_size() {
        let config = AdminConfig::from_lookup(lookup(&[("DATABASE_MAX_CONNECTIONS", "0")]));
        assert_eq!(config.max_connections, 5);
        let config = AdminConfig::from_lookup(lookup(&[("DATABASE_MAX_CONNECTIONS", "lots")]));
        assert_eq!(config.max_connections, 5);
    }
}
