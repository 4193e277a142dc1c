//! Error types for policytag.
//!
//! Library crates use [`PolicyTagError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Only the first three variants are batch-fatal by contract; per-chunk
//! classifier trouble is recovered inside the tagger and never surfaces here.

use std::path::PathBuf;

/// Top-level error type for all policytag operations.
#[derive(Debug, thiserror::Error)]
pub enum PolicyTagError {
    /// The markup produced no page boundary and no trailing content.
    #[error("empty document: no pages could be reconstructed from {file_name}")]
    EmptyDocument { file_name: String },

    /// The (insurer_code, product_code) pair is not in the product table.
    #[error("unknown product mapping: ({insurer_code}, {product_code}) is not registered")]
    UnknownProductMapping {
        insurer_code: String,
        product_code: String,
    },

    /// An LLM-requiring policy was requested without a credential.
    #[error("missing credential: {env_var} is not set")]
    MissingCredential { env_var: String },

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Markup or response parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Invalid input arguments or data.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Network/HTTP error talking to an external service.
    #[error("network error: {0}")]
    Network(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, PolicyTagError>;

impl PolicyTagError {
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

    /// Whether this error halts a whole batch by contract.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(
            self,
            Self::EmptyDocument { .. }
                | Self::UnknownProductMapping { .. }
                | Self::MissingCredential { .. }
        )
    }
}

impl From<serde_json::Error> for PolicyTagError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
