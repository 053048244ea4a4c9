//! Error types for protocol records.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while reading protocol records or applying changes.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    /// A required field is absent.
    #[error("missing field: {field}")]
    MissingField {
        /// Name of the missing field.
        field: String,
    },

    /// A field has the wrong type.
    #[error("field {field}: expected {expected}, found {found}")]
    InvalidField {
        /// Name of the field.
        field: String,
        /// Expected type.
        expected: &'static str,
        /// Actual type.
        found: &'static str,
    },

    /// A change kind name is not recognized.
    #[error("unknown change kind: {0}")]
    UnknownChangeKind(String),

    /// A query selector or sort directive is not recognized.
    #[error("unknown query operator: {0}")]
    UnknownOperator(String),

    /// A change cannot be applied to the current field value.
    #[error("cannot {kind} field {field} holding {found}")]
    NotApplicable {
        /// Change kind being applied.
        kind: &'static str,
        /// Target field.
        field: String,
        /// Type currently held by the field.
        found: &'static str,
    },
}

impl ProtocolError {
    /// Creates a missing field error.
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Creates an invalid field error.
    pub fn invalid(field: impl Into<String>, expected: &'static str, found: &'static str) -> Self {
        Self::InvalidField {
            field: field.into(),
            expected,
            found,
        }
    }
}
