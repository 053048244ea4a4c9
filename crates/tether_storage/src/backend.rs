//! Storage backend trait definition.

use crate::error::StorageResult;
use async_trait::async_trait;
use std::sync::Arc;

/// A key-value storage backend for Tether.
///
/// Backends are **opaque string stores**. The client persists its whole
/// durable state (installation id, session id, user snapshot, changelog)
/// through these three operations.
///
/// # Invariants
///
/// - `get_item` returns exactly the last value passed to `set_item` for
///   that key, or `None` after `remove_item` or if never set
/// - Each call is atomic from the caller's perspective; there is no
///   transaction spanning several keys
/// - Backends must be `Send + Sync`
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - Ephemeral
/// - [`super::FileBackend`] - Persistent
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Reads the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    async fn get_item(&self, key: &str) -> StorageResult<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn set_item(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Removes `key`. Removing a missing key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn remove_item(&self, key: &str) -> StorageResult<()>;
}

#[async_trait]
impl<T: StorageBackend + ?Sized> StorageBackend for Arc<T> {
    async fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        (**self).get_item(key).await
    }

    async fn set_item(&self, key: &str, value: &str) -> StorageResult<()> {
        (**self).set_item(key, value).await
    }

    async fn remove_item(&self, key: &str) -> StorageResult<()> {
        (**self).remove_item(key).await
    }
}
