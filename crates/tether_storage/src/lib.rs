//! # Tether Storage
//!
//! Key-value storage backends and the typed storage bridge for Tether.
//!
//! Backends are **opaque string stores**: they map keys to text values and
//! do not interpret what they hold. The [`StorageBridge`] layers typed
//! access on top of any backend:
//!
//! - primitive values (bool, number, text) stored as JSON scalars
//! - structured [`tether_codec::Value`]s stored with date-aware encoding
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - Ephemeral, the default when no storage is supplied
//! - [`FileBackend`] - A single JSON document on disk, locked to one process
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tether_storage::{InMemoryBackend, Primitive, StorageBridge};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let bridge = StorageBridge::new(Arc::new(InMemoryBackend::new()));
//! bridge.set_primitive("flag", &Primitive::Bool(true)).await.unwrap();
//! assert_eq!(bridge.get_primitive("flag").await.unwrap(), Some(Primitive::Bool(true)));
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod bridge;
mod error;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use bridge::{Primitive, StorageBridge};
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
