//! Error types for newsdigest.
//!
//! Library crates use [`NewsDigestError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Transport send failures are not part of this enum; they travel as
//! [`crate::SendFailure`] values carrying a [`crate::FailureKind`].

use std::path::PathBuf;

/// Top-level error type for all newsdigest operations.
#[derive(Debug, thiserror::Error)]
pub enum NewsDigestError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error talking to an upstream service.
    #[error("network error: {0}")]
    Network(String),

    /// HTML or JSON parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// The summarization service failed or returned nothing usable.
    #[error("summarization error: {0}")]
    Summarization(String),

    /// History retrieval for a single channel failed.
    #[error("ingestion error for @{handle}: {message}")]
    Ingestion { handle: String, message: String },

    /// The channel directory could not produce a channel list.
    #[error("registry error: {0}")]
    Registry(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad handle, impossible chunk size, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, NewsDigestError>;

impl NewsDigestError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create an ingestion error for one channel.
    pub fn ingestion(handle: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Ingestion {
            handle: handle.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
