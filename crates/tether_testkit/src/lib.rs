//! # Tether Testkit
//!
//! Test utilities for Tether.
//!
//! This crate provides:
//! - [`MemoryService`], an in-memory implementation of every endpoint with
//!   fault injection (lost responses, injected failures, deferred fields)
//! - A query evaluator backing `runQuery`
//! - Client fixtures over in-memory and temporary on-disk storage
//! - Property-based generators for user edits
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tether_testkit::prelude::*;
//!
//! #[tokio::test]
//! async fn edits_reach_the_service() {
//!     let service = std::sync::Arc::new(MemoryService::new());
//!     let (mut client, _storage) = guest_client(&service).await;
//!     client.current_user().unwrap().unwrap().set("name", "Ada");
//!     client.synchronize_user().await.unwrap();
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod fixtures;
pub mod generators;
pub mod query;
pub mod service;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::*;
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::service::*;
}

pub use error::{ServiceError, ServiceResult};
pub use fixtures::*;
pub use generators::*;
pub use query::evaluate;
pub use service::*;
