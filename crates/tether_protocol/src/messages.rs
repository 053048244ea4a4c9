//! Endpoint names and request/response messages.
//!
//! Requests are built as parameter objects; the dispatcher adds
//! [`INSTALLATION_ID`] and, when configured, [`MASTER_KEY`] before handing
//! them to the transport. Responses are the `result` value a transport
//! returns for a successful call.

use crate::changelog::Changelog;
use crate::error::{ProtocolError, ProtocolResult};
use crate::query::Query;
use tether_codec::{Object, Value};

/// Endpoint names, relative to the server URL.
pub mod endpoint {
    /// Creates an anonymous guest user and session.
    pub const LOG_IN_AS_GUEST: &str = "logInAsGuest";
    /// Creates a user with credentials and a session.
    pub const SIGN_UP: &str = "signUp";
    /// Opens a session for existing credentials.
    pub const LOG_IN: &str = "logIn";
    /// Attaches credentials to the current guest user.
    pub const CONVERT_GUEST_USER: &str = "convertGuestUser";
    /// Invalidates the current session.
    pub const LOG_OUT: &str = "logOut";
    /// Replays pending changes and returns the authoritative snapshot.
    pub const SYNCHRONIZE_USER: &str = "synchronizeUser";
    /// Runs a structural query. Requires the master key.
    pub const RUN_QUERY: &str = "runQuery";

    /// All built-in endpoints.
    pub const ALL: [&str; 7] = [
        LOG_IN_AS_GUEST,
        SIGN_UP,
        LOG_IN,
        CONVERT_GUEST_USER,
        LOG_OUT,
        SYNCHRONIZE_USER,
        RUN_QUERY,
    ];
}

/// Installation id attached to every request.
pub const INSTALLATION_ID: &str = "installationId";
/// Elevated key attached when configured.
pub const MASTER_KEY: &str = "masterKey";
/// Session id.
pub const SESSION_ID: &str = "sessionId";
/// User snapshot.
pub const USER_DATA: &str = "userData";
/// Pending change records.
pub const CHANGELOG: &str = "changelog";
/// Ids of changes the server applied.
pub const PROCESSED_CHANGES: &str = "processedChanges";
/// Account email.
pub const EMAIL: &str = "email";
/// Account password.
pub const PASSWORD: &str = "password";
/// Custom function parameters.
pub const PARAMS: &str = "params";
/// Serialized query record.
pub const QUERY: &str = "query";

/// Returns the field `name`, failing if it is absent.
pub fn required<'a>(object: &'a Object, name: &str) -> ProtocolResult<&'a Value> {
    object.get(name).ok_or_else(|| ProtocolError::missing(name))
}

/// Returns the text field `name`.
pub fn required_text<'a>(object: &'a Object, name: &str) -> ProtocolResult<&'a str> {
    let value = required(object, name)?;
    value
        .as_text()
        .ok_or_else(|| ProtocolError::invalid(name, "text", value.type_name()))
}

/// Returns the object field `name`.
pub fn required_object<'a>(object: &'a Object, name: &str) -> ProtocolResult<&'a Object> {
    let value = required(object, name)?;
    value
        .as_object()
        .ok_or_else(|| ProtocolError::invalid(name, "object", value.type_name()))
}

/// Returns the text field `name`, treating absent and null alike.
pub fn optional_text<'a>(object: &'a Object, name: &str) -> ProtocolResult<Option<&'a str>> {
    match object.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Text(s)) => Ok(Some(s)),
        Some(other) => Err(ProtocolError::invalid(name, "text", other.type_name())),
    }
}

fn as_record<'a>(value: &'a Value, what: &str) -> ProtocolResult<&'a Object> {
    value
        .as_object()
        .ok_or_else(|| ProtocolError::invalid(what, "object", value.type_name()))
}

/// Email and password for `signUp`, `logIn` and `convertGuestUser`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Account email.
    pub email: String,
    /// Account password.
    pub password: String,
}

impl Credentials {
    /// Creates credentials.
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Builds the request parameters.
    pub fn to_params(&self) -> Object {
        Object::from([
            (EMAIL.to_string(), Value::from(self.email.as_str())),
            (PASSWORD.to_string(), Value::from(self.password.as_str())),
        ])
    }

    /// Reads request parameters.
    pub fn from_params(params: &Object) -> ProtocolResult<Self> {
        Ok(Self::new(
            required_text(params, EMAIL)?,
            required_text(params, PASSWORD)?,
        ))
    }
}

/// A request naming only the session (`logOut`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRequest {
    /// Session id.
    pub session_id: String,
}

impl SessionRequest {
    /// Builds the request parameters.
    pub fn to_params(&self) -> Object {
        Object::from([(SESSION_ID.to_string(), Value::from(self.session_id.as_str()))])
    }

    /// Reads request parameters.
    pub fn from_params(params: &Object) -> ProtocolResult<Self> {
        Ok(Self {
            session_id: required_text(params, SESSION_ID)?.to_string(),
        })
    }
}

/// `convertGuestUser` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertRequest {
    /// Session of the guest user.
    pub session_id: String,
    /// Credentials to attach.
    pub credentials: Credentials,
}

impl ConvertRequest {
    /// Builds the request parameters.
    pub fn to_params(&self) -> Object {
        let mut params = self.credentials.to_params();
        params.insert(SESSION_ID.to_string(), Value::from(self.session_id.as_str()));
        params
    }

    /// Reads request parameters.
    pub fn from_params(params: &Object) -> ProtocolResult<Self> {
        Ok(Self {
            session_id: required_text(params, SESSION_ID)?.to_string(),
            credentials: Credentials::from_params(params)?,
        })
    }
}

/// `synchronizeUser` request.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncRequest {
    /// Session id.
    pub session_id: String,
    /// The full pending log, in order.
    pub changelog: Changelog,
}

impl SyncRequest {
    /// Builds the request parameters.
    pub fn to_params(&self) -> Object {
        Object::from([
            (SESSION_ID.to_string(), Value::from(self.session_id.as_str())),
            (CHANGELOG.to_string(), self.changelog.to_value()),
        ])
    }

    /// Reads request parameters.
    pub fn from_params(params: &Object) -> ProtocolResult<Self> {
        Ok(Self {
            session_id: required_text(params, SESSION_ID)?.to_string(),
            changelog: Changelog::from_value(required(params, CHANGELOG)?)?,
        })
    }
}

/// A custom function call.
#[derive(Debug, Clone, PartialEq)]
pub struct RunRequest {
    /// Session id, or `None` when logged out (sent as null).
    pub session_id: Option<String>,
    /// Caller-supplied parameters.
    pub params: Object,
}

impl RunRequest {
    /// Builds the request parameters.
    pub fn to_params(&self) -> Object {
        Object::from([
            (
                SESSION_ID.to_string(),
                self.session_id.as_deref().map_or(Value::Null, Value::from),
            ),
            (PARAMS.to_string(), Value::Object(self.params.clone())),
        ])
    }

    /// Reads request parameters.
    pub fn from_params(params: &Object) -> ProtocolResult<Self> {
        Ok(Self {
            session_id: optional_text(params, SESSION_ID)?.map(str::to_string),
            params: required_object(params, PARAMS)?.clone(),
        })
    }
}

/// `runQuery` request.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryRequest {
    /// The query record.
    pub query: Query,
}

impl QueryRequest {
    /// Builds the request parameters.
    pub fn to_params(&self) -> Object {
        Object::from([(QUERY.to_string(), self.query.to_value())])
    }

    /// Reads request parameters.
    pub fn from_params(params: &Object) -> ProtocolResult<Self> {
        Ok(Self {
            query: Query::from_value(required(params, QUERY)?)?,
        })
    }
}

/// Result of `logInAsGuest`, `signUp` and `logIn`.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionResponse {
    /// The new session id.
    pub session_id: String,
    /// The user's snapshot.
    pub user_data: Object,
}

impl SessionResponse {
    /// Converts to a result value.
    pub fn to_value(&self) -> Value {
        Value::object([
            (SESSION_ID, Value::from(self.session_id.as_str())),
            (USER_DATA, Value::Object(self.user_data.clone())),
        ])
    }

    /// Reads a result value.
    pub fn from_value(value: &Value) -> ProtocolResult<Self> {
        let record = as_record(value, "session response")?;
        Ok(Self {
            session_id: required_text(record, SESSION_ID)?.to_string(),
            user_data: required_object(record, USER_DATA)?.clone(),
        })
    }
}

/// Result of `convertGuestUser`.
#[derive(Debug, Clone, PartialEq)]
pub struct UserDataResponse {
    /// The user's snapshot.
    pub user_data: Object,
}

impl UserDataResponse {
    /// Converts to a result value.
    pub fn to_value(&self) -> Value {
        Value::object([(USER_DATA, Value::Object(self.user_data.clone()))])
    }

    /// Reads a result value.
    pub fn from_value(value: &Value) -> ProtocolResult<Self> {
        let record = as_record(value, "user data response")?;
        Ok(Self {
            user_data: required_object(record, USER_DATA)?.clone(),
        })
    }
}

/// Result of `synchronizeUser`.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncResponse {
    /// The authoritative snapshot after replay.
    pub user_data: Object,
    /// Ids of the entries the server applied.
    pub processed_changes: Vec<String>,
}

impl SyncResponse {
    /// Converts to a result value.
    pub fn to_value(&self) -> Value {
        Value::object([
            (USER_DATA, Value::Object(self.user_data.clone())),
            (
                PROCESSED_CHANGES,
                Value::Array(
                    self.processed_changes
                        .iter()
                        .map(|id| Value::from(id.as_str()))
                        .collect(),
                ),
            ),
        ])
    }

    /// Reads a result value.
    pub fn from_value(value: &Value) -> ProtocolResult<Self> {
        let record = as_record(value, "sync response")?;
        let processed = required(record, PROCESSED_CHANGES)?;
        let processed_changes = processed
            .as_array()
            .ok_or_else(|| ProtocolError::invalid(PROCESSED_CHANGES, "array", processed.type_name()))?
            .iter()
            .map(|id| {
                id.as_text()
                    .map(str::to_string)
                    .ok_or_else(|| ProtocolError::invalid(PROCESSED_CHANGES, "text", id.type_name()))
            })
            .collect::<ProtocolResult<Vec<_>>>()?;

        Ok(Self {
            user_data: required_object(record, USER_DATA)?.clone(),
            processed_changes,
        })
    }
}
