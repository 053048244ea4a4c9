//! # Tether Protocol
//!
//! Change-log and message types shared by the Tether client and any
//! service implementing the user-data endpoints.
//!
//! This crate provides:
//! - [`ChangeLogEntry`] and [`ChangeKind`] for pending field mutations
//! - [`Changelog`], the ordered, coalescing queue of pending entries
//! - Endpoint names and request/response messages ([`messages`])
//! - [`Query`], the structural query record forwarded to `runQuery`
//!
//! Every type converts to and from a [`tether_codec::Value`]; the wire
//! encoding itself lives in `tether_codec`. This is a pure protocol crate
//! with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change;
mod changelog;
mod error;
pub mod messages;
mod query;

pub use change::{ChangeKind, ChangeLogEntry};
pub use changelog::Changelog;
pub use error::{ProtocolError, ProtocolResult};
pub use query::{Predicate, Query, Selector, SortDirection, SortDirective};
