//! Configuration for the conversation history store.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::history::core::errors::{StoreError, StoreResult};

/// Environment variable overriding the database path.
pub const ENV_DB_PATH: &str = "CHATLOG_DB_PATH";
/// Environment variable overriding the placeholder owner of new conversations.
pub const ENV_DEFAULT_USER: &str = "CHATLOG_DEFAULT_USER";
/// Environment variable overriding the busy timeout in milliseconds.
pub const ENV_BUSY_TIMEOUT_MS: &str = "CHATLOG_BUSY_TIMEOUT_MS";

/// Storage configuration for the conversation store.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// `SQLite` database path. The parent directory is created on open.
    pub sqlite_path: PathBuf,
    /// Owner recorded on conversations created implicitly by a first turn.
    pub default_user_id: String,
    /// How long a write waits on a locked database before failing.
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("data").join("chatlog.db"),
            default_user_id: "default_user".to_string(),
            busy_timeout_ms: 5000,
        }
    }
}

impl StoreConfig {
    /// Config with defaults and a custom database path.
    #[must_use]
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            sqlite_path: path.into(),
            ..Self::default()
        }
    }

    /// Defaults overlaid with `CHATLOG_*` environment variables.
    ///
    /// # Errors
    /// Returns an error if a numeric variable cannot be parsed.
    pub fn from_env() -> StoreResult<Self> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var(ENV_DB_PATH) {
            config.sqlite_path = PathBuf::from(path);
        }
        if let Ok(user) = std::env::var(ENV_DEFAULT_USER) {
            config.default_user_id = user;
        }
        if let Ok(raw) = std::env::var(ENV_BUSY_TIMEOUT_MS) {
            config.busy_timeout_ms = raw.trim().parse().map_err(|err| {
                StoreError::InvalidConfig(format!("{ENV_BUSY_TIMEOUT_MS}={raw}: {err}"))
            })?;
        }

        Ok(config)
    }

    /// Busy timeout as a [`Duration`].
    #[must_use]
    pub const fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or empty.
    pub fn validate(&self) -> StoreResult<()> {
        if self.sqlite_path.as_os_str().is_empty() {
            return Err(StoreError::InvalidConfig(
                "sqlite_path must not be empty".to_string(),
            ));
        }

        if self.default_user_id.is_empty() {
            return Err(StoreError::InvalidConfig(
                "default_user_id must not be empty".to_string(),
            ));
        }

        if self.busy_timeout_ms == 0 {
            return Err(StoreError::InvalidConfig(
                "busy_timeout_ms must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = StoreConfig::default();
        assert_eq!(config.sqlite_path, PathBuf::from("data").join("chatlog.db"));
        assert_eq!(config.default_user_id, "default_user");
        assert_eq!(config.busy_timeout(), Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_rejects_empty_values() {
        let mut config = StoreConfig::with_path("");
        assert!(matches!(
            config.validate(),
            Err(StoreError::InvalidConfig(_))
        ));

        config.sqlite_path = PathBuf::from("x.db");
        config.default_user_id = String::new();
        assert!(config.validate().is_err());

        config.default_user_id = "someone".to_string();
        config.busy_timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_partial_deserialize() {
        let config: StoreConfig =
            serde_json::from_str(r#"{"sqlite_path": "/tmp/other.db"}"#).unwrap();
        assert_eq!(config.sqlite_path, PathBuf::from("/tmp/other.db"));
        assert_eq!(config.default_user_id, "default_user");
    }
}
