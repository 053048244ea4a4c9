//! Test fixtures and client helpers.
//!
//! Provides convenience functions for wiring clients to a
//! [`MemoryService`] over in-memory or on-disk storage.

use crate::service::MemoryService;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tether_client::{Client, ClientConfig};
use tether_storage::{FileBackend, InMemoryBackend, StorageBackend};

/// Server URL used by every fixture.
pub const TEST_SERVER_URL: &str = "https://tether.test";

/// Builds a config that routes requests to `service` and stores state in
/// `storage`.
pub fn test_config(service: &Arc<MemoryService>, storage: Arc<dyn StorageBackend>) -> ClientConfig {
    ClientConfig::new(TEST_SERVER_URL)
        .with_request_function(service.clone())
        .with_storage(storage)
}

/// Connects a client to `service` over `storage`.
pub async fn connect(service: &Arc<MemoryService>, storage: Arc<dyn StorageBackend>) -> Client {
    Client::connect(test_config(service, storage))
        .await
        .expect("Failed to initialize client")
}

/// Connects a client to `service` over fresh in-memory storage.
pub async fn memory_client(service: &Arc<MemoryService>) -> (Client, Arc<InMemoryBackend>) {
    let storage = Arc::new(InMemoryBackend::new());
    let client = connect(service, storage.clone()).await;
    (client, storage)
}

/// Connects a client to `service` and logs in as a guest.
pub async fn guest_client(service: &Arc<MemoryService>) -> (Client, Arc<InMemoryBackend>) {
    let (mut client, storage) = memory_client(service).await;
    client
        .log_in_as_guest()
        .await
        .expect("Failed to log in as guest");
    (client, storage)
}

/// A storage document in a temporary directory.
///
/// The file backend locks its document, so open it again only after the
/// previous backend has been dropped.
pub struct TempStore {
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: TempDir,
    path: PathBuf,
}

impl TempStore {
    /// Creates a store location in a new temporary directory.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("client").join("store.json");
        Self {
            _temp_dir: temp_dir,
            path,
        }
    }

    /// Returns the document path.
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Opens the document.
    pub fn open(&self) -> Arc<FileBackend> {
        Arc::new(FileBackend::open_with_create_dirs(&self.path).expect("Failed to open store"))
    }
}

impl Default for TempStore {
    fn default() -> Self {
        Self::new()
    }
}
