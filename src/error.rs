//! Error handling utilities shared across the crate.

use std::path::PathBuf;

use thiserror::Error;

/// Convenient result type used throughout the crate.
pub type Result<T, E = SaniproError> = std::result::Result<T, E>;

/// Domain-specific error describing failures while tokenizing, configuring, or loading prompts.
#[derive(Debug, Error)]
pub enum SaniproError {
    /// The prompt is structurally malformed and cannot be tokenized.
    #[error("invalid syntax at position {position}: {reason}")]
    InvalidSyntax {
        /// Human readable description of the violation.
        reason: String,
        /// Character index where the violation was detected.
        position: usize,
    },
    /// Pipeline, filter, or file configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Filesystem IO error with optional context path.
    #[error("io error while processing {path:?}: {source}")]
    Io {
        /// Underlying IO error returned by the standard library.
        source: std::io::Error,
        /// Target path associated with the IO failure if available.
        path: Option<PathBuf>,
    },
    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for SaniproError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for SaniproError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl SaniproError {
    /// Helper constructor that attaches an optional path when wrapping IO errors.
    pub fn io(source: std::io::Error, path: Option<PathBuf>) -> Self {
        Self::Io { source, path }
    }

    /// Helper constructor for tokenizer syntax errors.
    pub fn syntax(reason: impl Into<String>, position: usize) -> Self {
        Self::InvalidSyntax {
            reason: reason.into(),
            position,
        }
    }

    /// Returns `true` when the error came from the tokenizer rather than configuration or IO.
    #[must_use]
    pub fn is_syntax(&self) -> bool {
        matches!(self, Self::InvalidSyntax { .. })
    }
}
