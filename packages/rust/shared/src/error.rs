//! Error types for the ICP qualifier.
//!
//! Library crates use [`QualifierError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all qualifier operations.
#[derive(Debug, thiserror::Error)]
pub enum QualifierError {
    /// Configuration loading or validation error. The only fatal class.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error talking to a search backend or a company website.
    #[error("network error: {0}")]
    Network(String),

    /// Unparsable payload (search response, classifier output, stored JSON).
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Result store read/write error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Classifier (LLM) invocation error.
    #[error("classifier error: {0}")]
    Classifier(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// HTML-to-text conversion error.
    #[error("conversion error: {0}")]
    Conversion(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, QualifierError>;

impl QualifierError {
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
