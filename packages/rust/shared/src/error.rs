//! Error types for rulefeed.
//!
//! Library crates use [`RulefeedError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all rulefeed operations.
#[derive(Debug, thiserror::Error)]
pub enum RulefeedError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error while fetching a feed (transport failure or non-2xx).
    #[error("fetch error: {0}")]
    Fetch(String),

    /// Malformed rule document.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// External rule-set converter failed or could not be started.
    #[error("conversion error: {0}")]
    Conversion(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Version-control publishing failed.
    #[error("publish error: {0}")]
    Publish(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, RulefeedError>;

impl RulefeedError {
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

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
