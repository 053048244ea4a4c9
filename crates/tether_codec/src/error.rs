//! Error types for the codec crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur during encoding or decoding.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The input was not valid JSON, or JSON output failed.
    #[error("json error: {message}")]
    Json {
        /// Description of the JSON error.
        message: String,
    },

    /// A tagged value (`$date`, `$float`, `$object`) had an invalid payload.
    #[error("invalid {tag} value: {message}")]
    InvalidTag {
        /// The tag key.
        tag: &'static str,
        /// Description of the problem.
        message: String,
    },

    /// The decoded value did not have the expected shape.
    #[error("invalid structure: {message}")]
    InvalidStructure {
        /// Description of the structural error.
        message: String,
    },
}

impl CodecError {
    /// Create a JSON error.
    pub fn json(message: impl Into<String>) -> Self {
        Self::Json {
            message: message.into(),
        }
    }

    /// Create an invalid tag error.
    pub fn invalid_tag(tag: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidTag {
            tag,
            message: message.into(),
        }
    }

    /// Create an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        Self::json(err.to_string())
    }
}
