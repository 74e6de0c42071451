//! Error types for storygraph.
//!
//! Library crates use [`StoryGraphError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all storygraph operations.
#[derive(Debug, thiserror::Error)]
pub enum StoryGraphError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport failure or non-success HTTP status.
    #[error("network error: {0}")]
    Network(String),

    /// Expected markup (link, form, block) was missing or malformed.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Date text on a page did not match any known format.
    #[error("can't parse date: {text:?}")]
    Date { text: String },

    /// Login did not produce a signed-in page.
    #[error("authentication error: {0}")]
    Auth(String),

    /// No CSRF token could be obtained for a mutating request.
    #[error("csrf error: {0}")]
    Csrf(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Credentials file could not be read or written as JSON.
    #[error("json error: {0}")]
    Json(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, StoryGraphError>;

impl StoryGraphError {
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

    /// Create a date error for the offending text.
    pub fn date(text: impl Into<String>) -> Self {
        Self::Date { text: text.into() }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
