//! Errors raised by the in-memory service.

use thiserror::Error;

/// Result type for service handlers.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// A failed call, reported to the client as an error envelope.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Malformed parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Unknown session or bad credentials.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Missing or wrong master key.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// No such endpoint or function.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request clashes with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A failure raised by a custom function or injected by a test.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Returns the status code carried in the error envelope.
    pub fn code(&self) -> i64 {
        match self {
            ServiceError::InvalidRequest(_) => 400,
            ServiceError::AuthenticationFailed(_) => 401,
            ServiceError::NotAuthorized(_) => 403,
            ServiceError::NotFound(_) => 404,
            ServiceError::Conflict(_) => 409,
            ServiceError::Internal(_) => 500,
        }
    }

    /// Returns true if this is a client error (4xx).
    pub fn is_client_error(&self) -> bool {
        self.code() < 500
    }
}

impl From<tether_protocol::ProtocolError> for ServiceError {
    fn from(e: tether_protocol::ProtocolError) -> Self {
        ServiceError::InvalidRequest(e.to_string())
    }
}
