//! # Tether Client
//!
//! Client-side session management and change-log synchronization.
//!
//! A [`Client`] holds at most one logged-in user. Local edits made through
//! [`UserHandle`] are applied optimistically to a snapshot of the user
//! record and queued in a coalescing changelog. [`Client::synchronize_user`]
//! sends the queue, replaces the snapshot with the server's copy and drops
//! every entry the server reports as processed; the rest are resent later.
//!
//! ## Design Principles
//!
//! - **Server wins**: the snapshot is replaced wholesale after every sync
//! - **At-least-once delivery**: entries stay queued until acknowledged
//! - **Pluggable I/O**: storage and transport are traits
//! - **No hidden state**: the session id, snapshot and changelog live
//!   together and are persisted under four well-known keys
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tether_client::{Client, ClientConfig, MockTransport};
//! use tether_codec::{Object, Value};
//! use tether_protocol::messages::{endpoint, SessionResponse};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let transport = Arc::new(MockTransport::new());
//! transport.push_response(
//!     endpoint::LOG_IN_AS_GUEST,
//!     SessionResponse { session_id: "s1".into(), user_data: Object::new() }.to_value(),
//! );
//!
//! let config = ClientConfig::new("https://api.example.com").with_request_function(transport);
//! let mut client = Client::connect(config).await.unwrap();
//! client.log_in_as_guest().await.unwrap();
//!
//! let mut user = client.current_user().unwrap().unwrap();
//! user.set("name", "Ada");
//! assert_eq!(user.get("name"), Some(&Value::from("Ada")));
//! assert_eq!(user.pending_changes(), 1);
//! # });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod config;
mod error;
pub mod http;
mod keys;
mod session;
mod transport;
mod user;

pub use client::Client;
pub use config::{ClientConfig, DEFAULT_KEY_PREFIX, DEFAULT_REQUEST_TIMEOUT};
pub use error::{ClientError, ClientResult};
pub use http::{interpret_response, HttpTransport};
pub use keys::StorageKeys;
pub use session::{ClientState, LogoutOutcome, SyncOutcome};
pub use transport::{endpoint_of, MockTransport, RecordedCall, RequestFunction};
pub use user::UserHandle;

pub use tether_codec::{Object, Value};
pub use tether_protocol::{ChangeKind, Query, SortDirection};
