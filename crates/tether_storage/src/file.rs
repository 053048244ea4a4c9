//! File-based storage backend for persistent storage.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use async_trait::async_trait;
use fs2::FileExt;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// A file-based storage backend.
///
/// All items live in a single JSON document (`{"key": "value", ...}`)
/// that is loaded on open and rewritten on every change.
///
/// # Layout
///
/// ```text
/// <path>        # JSON document with all items
/// <path>.lock   # Advisory lock held while the backend is open
/// <path>.tmp    # Scratch file for atomic rewrites
/// ```
///
/// # Durability
///
/// Each write goes to the scratch file, is synced, then renamed over the
/// document, so a crash leaves either the old or the new document.
///
/// # Thread Safety
///
/// Writes are serialized by an async mutex. The lock file keeps a second
/// process (or a second backend in this process) from opening the same
/// store, which would otherwise let two clients fight over one identity.
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    items: Mutex<BTreeMap<String, String>>,
    _lock_file: File,
}

impl FileBackend {
    /// Opens or creates a file backend at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Another backend holds the lock (returns `Locked`)
    /// - The existing document is not a JSON string map (returns `Corrupted`)
    /// - I/O errors occur
    pub fn open(path: &Path) -> StorageResult<Self> {
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(sibling(path, ".lock"))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked {
                path: path.to_path_buf(),
            });
        }

        let items = match std::fs::read_to_string(path) {
            Ok(text) if text.trim().is_empty() => BTreeMap::new(),
            Ok(text) => serde_json::from_str(&text)
                .map_err(|e| StorageError::Corrupted(format!("{}: {e}", path.display())))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!(path = %path.display(), items = items.len(), "opened file storage");

        Ok(Self {
            path: path.to_path_buf(),
            items: Mutex::new(items),
            _lock_file: lock_file,
        })
    }

    /// Opens or creates a file backend, creating parent directories if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if directories cannot be created or the file cannot be opened.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path to the underlying document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rewrites the document atomically.
    async fn persist(&self, items: &BTreeMap<String, String>) -> StorageResult<()> {
        let data = serde_json::to_vec_pretty(items)
            .map_err(|e| StorageError::Corrupted(e.to_string()))?;
        let temp_path = sibling(&self.path, ".tmp");

        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl StorageBackend for FileBackend {
    async fn get_item(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.items.lock().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut items = self.items.lock().await;
        let previous = items.insert(key.to_string(), value.to_string());
        if let Err(e) = self.persist(&items).await {
            // keep memory in step with disk
            match previous {
                Some(old) => items.insert(key.to_string(), old),
                None => items.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> StorageResult<()> {
        let mut items = self.items.lock().await;
        let Some(previous) = items.remove(key) else {
            return Ok(());
        };
        if let Err(e) = self.persist(&items).await {
            items.insert(key.to_string(), previous);
            return Err(e);
        }
        Ok(())
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}
