//! Error types for Taskhive.
//!
//! One enum for the whole backend. Service code raises the typed
//! variants (`NotFound`, `Forbidden`, `InvalidArgument`, `Conflict`,
//! `Transient`); the API layer translates them to status codes. The
//! remaining variants cover ambient failures (storage, config, IO).

use std::io;
use thiserror::Error;

/// Taskhive global error type
#[derive(Debug, Error)]
pub enum Error {
    /// Conversation, message, user or notification absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// Authorization failure: not a participant, or write to an
    /// archived conversation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Malformed id, missing required field
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A write that would clash with existing state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Storage or network timeout, safe to retry
    #[error("Transient failure: {0}")]
    Transient(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Shorthand for corrupted or inconsistent stored state.
    pub fn bad_database(message: &str) -> Self {
        tracing::warn!("Bad database: {}", message);
        Self::Database(message.to_owned())
    }

    /// Whether a caller may safely retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

/// Taskhive global result type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn test_error_display() {
        let err = Error::NotFound("conversation".to_string());
        assert_eq!(err.to_string(), "Not found: conversation");

        let err = Error::Forbidden("not a participant".to_string());
        assert_eq!(err.to_string(), "Forbidden: not a participant");

        let err = Error::InvalidArgument("missing content".to_string());
        assert_eq!(err.to_string(), "Invalid argument: missing content");

        let err = Error::Conflict("stale cursor".to_string());
        assert_eq!(err.to_string(), "Conflict: stale cursor");

        let err = Error::Transient("storage timeout".to_string());
        assert_eq!(err.to_string(), "Transient failure: storage timeout");
    }

    #[test_log::test]
    fn test_retryable() {
        assert!(Error::Transient("timeout".into()).is_retryable());
        assert!(!Error::Forbidden("nope".into()).is_retryable());
        assert!(!Error::Database("broken".into()).is_retryable());
    }

    #[test_log::test]
    fn test_from_io() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "gone");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("IO error"));
    }

    #[test_log::test]
    fn test_from_serde() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: Error = json_err.into();
        assert!(err.to_string().contains("Serialization error"));
    }
}
