//! Error types for the conversation history store.

use thiserror::Error;

/// Conversation history store error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Invalid configuration or unsupported values.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A required identifier or field was missing on a write.
    #[error("validation failed: {0}")]
    Validation(String),
    /// A stored row could not be decoded.
    #[error("invalid stored record: {0}")]
    InvalidRecord(String),
    /// `SQLite` storage error (sync).
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// `SQLite` storage error (async).
    #[error("tokio-rusqlite error: {0}")]
    TokioSqlite(#[from] tokio_rusqlite::Error),
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification surfaced to callers.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    /// Caller input must be corrected before retrying.
    Validation,
    /// Engine-level failure: corruption, disk full, schema mismatch.
    Storage,
    /// Export destination could not be written.
    Io,
}

impl StoreError {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidConfig(_) | Self::Validation(_) => ErrorKind::Validation,
            Self::InvalidRecord(_)
            | Self::Sqlite(_)
            | Self::TokioSqlite(_)
            | Self::Serialization(_) => ErrorKind::Storage,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Build a validation error for a missing or empty field.
    pub(crate) fn missing(field: &str) -> Self {
        Self::Validation(format!("{field} must not be empty"))
    }
}

/// Convenience result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(StoreError::missing("user_id").kind(), ErrorKind::Validation);
        assert_eq!(
            StoreError::InvalidConfig("x".to_string()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            StoreError::InvalidRecord("bad".to_string()).kind(),
            ErrorKind::Storage
        );
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(StoreError::from(io).kind(), ErrorKind::Io);
    }

    #[test]
    fn test_missing_message() {
        let err = StoreError::missing("conversation_id");
        assert_eq!(
            err.to_string(),
            "validation failed: conversation_id must not be empty"
        );
    }
}
