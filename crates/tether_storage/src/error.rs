//! Error types for storage operations.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The storage file could not be parsed.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// Another process holds the storage lock.
    #[error("storage locked: {} is in use by another process", .path.display())]
    Locked {
        /// Path of the locked store.
        path: PathBuf,
    },

    /// A stored value could not be encoded or decoded.
    #[error("codec error for key {key}: {source}")]
    Codec {
        /// The key being read or written.
        key: String,
        /// Underlying codec error.
        #[source]
        source: tether_codec::CodecError,
    },

    /// A stored value decoded to an unexpected shape.
    #[error("unexpected value for key {key}: expected {expected}, found {found}")]
    TypeMismatch {
        /// The key being read.
        key: String,
        /// What the caller asked for.
        expected: &'static str,
        /// What the store contained.
        found: &'static str,
    },
}

impl StorageError {
    /// Creates a codec error for `key`.
    pub fn codec(key: impl Into<String>, source: tether_codec::CodecError) -> Self {
        Self::Codec {
            key: key.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = StorageError::Locked {
            path: PathBuf::from("/tmp/store.json"),
        };
        assert!(err.to_string().contains("/tmp/store.json"));

        let err = StorageError::TypeMismatch {
            key: "k".into(),
            expected: "primitive",
            found: "array",
        };
        assert_eq!(
            err.to_string(),
            "unexpected value for key k: expected primitive, found array"
        );
    }
}
