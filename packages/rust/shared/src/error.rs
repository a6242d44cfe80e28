//! Error types for SowScribe.
//!
//! Library crates use [`SowscribeError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all SowScribe operations.
#[derive(Debug, thiserror::Error)]
pub enum SowscribeError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport-level HTTP failure (connect, timeout, body read).
    #[error("network error: {0}")]
    Network(String),

    /// A remote API answered with a non-success status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Response body or markup could not be parsed.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad identifier, malformed URL, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A streamed run reported a failure or the event stream broke off.
    #[error("stream error: {0}")]
    Stream(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, SowscribeError>;

impl SowscribeError {
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

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = SowscribeError::config("missing wiki token");
        assert_eq!(err.to_string(), "config error: missing wiki token");

        let err = SowscribeError::Api {
            status: 401,
            message: "Unauthorized".into(),
        };
        assert_eq!(err.to_string(), "API error: 401 - Unauthorized");
    }

    #[test]
    fn io_error_carries_path() {
        let source = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = SowscribeError::io("sows/MSA_2023.txt", source);
        assert!(err.to_string().contains("MSA_2023.txt"));
    }
}
