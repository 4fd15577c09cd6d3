//! Error types for the ASN sync system
//!
//! This module defines all error types used throughout the workspace.
//! The variants follow the run's recovery rules: fetch, authentication and
//! state errors abort a run, parse errors skip a row, remote read errors skip
//! a bucket, remote write errors are recorded and reported at the end.

use thiserror::Error;

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the ASN sync system
#[derive(Error, Debug)]
pub enum Error {
    /// Dataset could not be downloaded or unpacked
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// A dataset row could not be parsed
    #[error("Parse error at row {row}: {message}")]
    Parse {
        /// 1-based row number within its file
        row: usize,
        /// What was wrong with the row
        message: String,
    },

    /// Current tag membership could not be read
    #[error("Remote read error: {0}")]
    RemoteRead(String),

    /// A tag create/add/remove call failed
    #[error("Remote write error: {0}")]
    RemoteWrite(String),

    /// State store-related errors
    #[error("State store error: {0}")]
    StateStore(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Requested object does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a fetch error
    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch(msg.into())
    }

    /// Create a parse error for the given row
    pub fn parse(row: usize, msg: impl Into<String>) -> Self {
        Self::Parse {
            row,
            message: msg.into(),
        }
    }

    /// Create a remote read error
    pub fn remote_read(msg: impl Into<String>) -> Self {
        Self::RemoteRead(msg.into())
    }

    /// Create a remote write error
    pub fn remote_write(msg: impl Into<String>) -> Self {
        Self::RemoteWrite(msg.into())
    }

    /// Create a state store error
    pub fn state_store(msg: impl Into<String>) -> Self {
        Self::StateStore(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Whether this error must abort the whole run
    ///
    /// Row and bucket level errors are recovered locally by the engine;
    /// everything that leaves the engine without a usable dataset, session
    /// or state store is fatal.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Fetch(_)
                | Self::Authentication(_)
                | Self::StateStore(_)
                | Self::Config(_)
                | Self::Io(_)
        )
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(Error::fetch("archive missing").is_fatal());
        assert!(Error::auth("bad password").is_fatal());
        assert!(!Error::remote_read("timeout").is_fatal());
        assert!(!Error::remote_write("409").is_fatal());
        assert!(!Error::parse(3, "bad cidr").is_fatal());
    }

    #[test]
    fn test_parse_error_display() {
        let err = Error::parse(12, "missing organization");
        assert_eq!(err.to_string(), "Parse error at row 12: missing organization");
    }
}
