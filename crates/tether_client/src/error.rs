//! Error types for the client.

use tether_codec::CodecError;
use tether_protocol::ProtocolError;
use tether_storage::StorageError;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur during client operations.
#[derive(Error, Debug)]
pub enum ClientError {
    /// `initialize` was called on an initialized client.
    #[error("client is already initialized")]
    AlreadyInitialized,

    /// An operation was called before `initialize`.
    #[error("client is not initialized")]
    Uninitialized,

    /// The server URL does not use https.
    #[error("server url must use https: {url}")]
    SslRequired {
        /// The rejected URL.
        url: String,
    },

    /// A log-in variant was called while a user is logged in.
    #[error("a user is still logged in")]
    StillLoggedIn,

    /// An operation needs a logged-in user.
    #[error("no user is logged in")]
    NotLoggedIn,

    /// `run_query` was called without a configured master key.
    #[error("a master key is required for this operation")]
    MasterKeyRequired,

    /// A custom function name is empty or not ASCII alphanumeric.
    #[error("function name must be alphanumeric: {name:?}")]
    NonAlphanumericFunctionName {
        /// The rejected name.
        name: String,
    },

    /// A custom function name collides with a built-in endpoint.
    #[error("function name is reserved for a built-in endpoint: {name:?}")]
    ReservedFunctionName {
        /// The rejected name.
        name: String,
    },

    /// A local edit cannot be applied to the current field value.
    #[error("invalid change: {0}")]
    InvalidChange(#[source] ProtocolError),

    /// The server failed with a server-class code (500 and above).
    #[error("server error {code}: {message}")]
    Server {
        /// Status code reported by the server.
        code: i64,
        /// Message reported by the server.
        message: String,
    },

    /// The server rejected the request.
    #[error("request failed: {0}")]
    Request(String),

    /// Network or HTTP failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// A response did not have the expected shape.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Local storage failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// A payload could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

impl ClientError {
    /// Returns true for local guard failures.
    ///
    /// These are raised before any network call and will fail the same
    /// way again; the call site has to change.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            ClientError::AlreadyInitialized
                | ClientError::Uninitialized
                | ClientError::SslRequired { .. }
                | ClientError::StillLoggedIn
                | ClientError::NotLoggedIn
                | ClientError::MasterKeyRequired
                | ClientError::NonAlphanumericFunctionName { .. }
                | ClientError::ReservedFunctionName { .. }
                | ClientError::InvalidChange(_)
        )
    }

    /// Returns true if calling again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Transport(_) | ClientError::Server { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_classes() {
        assert!(ClientError::StillLoggedIn.is_precondition());
        assert!(ClientError::MasterKeyRequired.is_precondition());
        assert!(!ClientError::StillLoggedIn.is_retryable());

        assert!(ClientError::Transport("reset".into()).is_retryable());
        assert!(ClientError::Server {
            code: 503,
            message: "busy".into()
        }
        .is_retryable());

        let request = ClientError::Request("bad password".into());
        assert!(!request.is_retryable());
        assert!(!request.is_precondition());
    }

    #[test]
    fn error_display() {
        let err = ClientError::NonAlphanumericFunctionName {
            name: "bad name!".into(),
        };
        assert_eq!(
            err.to_string(),
            "function name must be alphanumeric: \"bad name!\""
        );

        let err = ClientError::Server {
            code: 502,
            message: "upstream".into(),
        };
        assert_eq!(err.to_string(), "server error 502: upstream");
    }

    #[test]
    fn protocol_errors_convert() {
        let err: ClientError = ProtocolError::missing("userData").into();
        assert!(matches!(err, ClientError::Protocol(_)));
    }
}
