//! An in-memory Tether service.
//!
//! [`MemoryService`] implements every endpoint the client calls and plugs
//! in as its request function. Responses travel the same way they would
//! over HTTP: each handler result is wrapped in a status envelope, encoded
//! to text, decoded and unwrapped by [`interpret_response`].

use crate::error::{ServiceError, ServiceResult};
use crate::query;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tether_client::http::{CODE, MESSAGE, RESULT, STATUS, STATUS_OK};
use tether_client::{endpoint_of, interpret_response, ClientError, ClientResult, RequestFunction};
use tether_codec::{Object, Value};
use tether_protocol::messages::{
    self, endpoint, ConvertRequest, Credentials, QueryRequest, RunRequest, SessionRequest,
    SessionResponse, SyncRequest, SyncResponse, UserDataResponse,
};
use tether_protocol::ChangeLogEntry;
use tracing::debug;
use uuid::Uuid;

/// A custom function: receives the caller's user record (if logged in)
/// and the call parameters.
pub type CustomFunction =
    Arc<dyn Fn(Option<&Object>, &Object) -> ServiceResult<Value> + Send + Sync>;

/// A stored user.
#[derive(Debug, Clone, Default)]
struct UserRecord {
    data: Object,
    password: Option<String>,
    /// Ids of every change already applied.
    processed: HashSet<String>,
}

#[derive(Default)]
struct ServiceState {
    users: HashMap<String, UserRecord>,
    /// Session id to user id.
    sessions: HashMap<String, String>,
    /// Email to user id.
    accounts: HashMap<String, String>,
    collections: HashMap<String, Vec<Object>>,
    functions: HashMap<String, CustomFunction>,
}

/// Injected failures, consumed one call at a time.
#[derive(Default)]
struct Faults {
    /// Endpoints whose next response is dropped after the call is handled.
    lose_next: HashMap<String, usize>,
    /// Endpoints whose next call fails before it is handled.
    fail_next: HashMap<String, Vec<ServiceError>>,
    /// Fields whose changes are never acknowledged.
    deferred_fields: HashSet<String>,
}

/// An in-memory Tether service.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use tether_client::{Client, ClientConfig};
/// use tether_testkit::MemoryService;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let service = Arc::new(MemoryService::new());
/// let config = ClientConfig::new("https://tether.test").with_request_function(service.clone());
/// let mut client = Client::connect(config).await.unwrap();
///
/// client.log_in_as_guest().await.unwrap();
/// assert_eq!(service.session_count(), 1);
/// # });
/// ```
pub struct MemoryService {
    master_key: Option<String>,
    state: Mutex<ServiceState>,
    faults: Mutex<Faults>,
    calls: Mutex<Vec<String>>,
}

impl Default for MemoryService {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryService {
    /// Creates an empty service without a master key.
    pub fn new() -> Self {
        Self {
            master_key: None,
            state: Mutex::new(ServiceState::default()),
            faults: Mutex::new(Faults::default()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Requires `key` on `runQuery`.
    #[must_use]
    pub fn with_master_key(mut self, key: impl Into<String>) -> Self {
        self.master_key = Some(key.into());
        self
    }

    /// Registers a custom function under `name`.
    pub fn register_function<F>(&self, name: &str, function: F)
    where
        F: Fn(Option<&Object>, &Object) -> ServiceResult<Value> + Send + Sync + 'static,
    {
        self.state
            .lock()
            .functions
            .insert(name.to_string(), Arc::new(function));
    }

    /// Adds a document to `collection` for `runQuery`.
    pub fn insert_document(&self, collection: &str, document: Object) {
        self.state
            .lock()
            .collections
            .entry(collection.to_string())
            .or_default()
            .push(document);
    }

    /// Handles the next call to `endpoint` but fails it with a transport
    /// error, as if the response was lost on the way back.
    pub fn lose_next_response(&self, endpoint: &str) {
        *self
            .faults
            .lock()
            .lose_next
            .entry(endpoint.to_string())
            .or_default() += 1;
    }

    /// Fails the next call to `endpoint` with `error` without handling it.
    pub fn fail_next(&self, endpoint: &str, error: ServiceError) {
        self.faults
            .lock()
            .fail_next
            .entry(endpoint.to_string())
            .or_default()
            .push(error);
    }

    /// Stops acknowledging changes to `field`.
    pub fn defer_field(&self, field: &str) {
        self.faults.lock().deferred_fields.insert(field.to_string());
    }

    /// Resumes acknowledging changes to `field`.
    pub fn accept_field(&self, field: &str) {
        self.faults.lock().deferred_fields.remove(field);
    }

    /// Returns the stored record of the user behind `session_id`.
    pub fn user_data(&self, session_id: &str) -> Option<Object> {
        let state = self.state.lock();
        let user_id = state.sessions.get(session_id)?;
        state.users.get(user_id).map(|u| u.data.clone())
    }

    /// Overwrites a field of the user behind `session_id`, as another
    /// device would.
    pub fn set_user_field(&self, session_id: &str, field: &str, value: Value) -> bool {
        let mut state = self.state.lock();
        let Some(user_id) = state.sessions.get(session_id).cloned() else {
            return false;
        };
        match state.users.get_mut(&user_id) {
            Some(user) => {
                user.data.insert(field.to_string(), value);
                true
            }
            None => false,
        }
    }

    /// Returns true if `session_id` is live.
    pub fn has_session(&self, session_id: &str) -> bool {
        self.state.lock().sessions.contains_key(session_id)
    }

    /// Returns the number of live sessions.
    pub fn session_count(&self) -> usize {
        self.state.lock().sessions.len()
    }

    /// Returns the number of users.
    pub fn user_count(&self) -> usize {
        self.state.lock().users.len()
    }

    /// Returns the endpoints called so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Returns how many times `endpoint` was called.
    pub fn call_count(&self, endpoint: &str) -> usize {
        self.calls.lock().iter().filter(|c| *c == endpoint).count()
    }

    /// Routes one call to its handler.
    pub fn handle(&self, route: &str, params: &Object) -> ServiceResult<Value> {
        messages::required_text(params, messages::INSTALLATION_ID)?;

        match route {
            endpoint::LOG_IN_AS_GUEST => self.log_in_as_guest(),
            endpoint::SIGN_UP => self.sign_up(&Credentials::from_params(params)?),
            endpoint::LOG_IN => self.log_in(&Credentials::from_params(params)?),
            endpoint::CONVERT_GUEST_USER => {
                self.convert_guest_user(ConvertRequest::from_params(params)?)
            }
            endpoint::LOG_OUT => self.log_out(&SessionRequest::from_params(params)?),
            endpoint::SYNCHRONIZE_USER => self.synchronize_user(SyncRequest::from_params(params)?),
            endpoint::RUN_QUERY => self.run_query(params),
            name => self.run_function(name, RunRequest::from_params(params)?),
        }
    }

    fn open_session(state: &mut ServiceState, user_id: &str) -> ServiceResult<Value> {
        let user = state
            .users
            .get(user_id)
            .ok_or_else(|| ServiceError::Internal(format!("dangling user {user_id}")))?;
        let session_id = Uuid::new_v4().to_string();
        let response = SessionResponse {
            session_id: session_id.clone(),
            user_data: user.data.clone(),
        };
        state.sessions.insert(session_id, user_id.to_string());
        Ok(response.to_value())
    }

    fn log_in_as_guest(&self) -> ServiceResult<Value> {
        let mut state = self.state.lock();
        let user_id = Uuid::new_v4().to_string();
        state.users.insert(user_id.clone(), UserRecord::default());
        Self::open_session(&mut state, &user_id)
    }

    fn sign_up(&self, credentials: &Credentials) -> ServiceResult<Value> {
        let mut state = self.state.lock();
        if state.accounts.contains_key(&credentials.email) {
            return Err(ServiceError::Conflict(format!(
                "{} is already registered",
                credentials.email
            )));
        }
        let user_id = Uuid::new_v4().to_string();
        let user = UserRecord {
            data: Object::from([(
                messages::EMAIL.to_string(),
                Value::from(credentials.email.as_str()),
            )]),
            password: Some(credentials.password.clone()),
            processed: HashSet::new(),
        };
        state.users.insert(user_id.clone(), user);
        state
            .accounts
            .insert(credentials.email.clone(), user_id.clone());
        Self::open_session(&mut state, &user_id)
    }

    fn log_in(&self, credentials: &Credentials) -> ServiceResult<Value> {
        let mut state = self.state.lock();
        let user_id = state
            .accounts
            .get(&credentials.email)
            .filter(|id| {
                state
                    .users
                    .get(*id)
                    .is_some_and(|u| u.password.as_deref() == Some(credentials.password.as_str()))
            })
            .cloned()
            .ok_or_else(|| ServiceError::AuthenticationFailed("invalid credentials".into()))?;
        Self::open_session(&mut state, &user_id)
    }

    fn convert_guest_user(&self, request: ConvertRequest) -> ServiceResult<Value> {
        let mut state = self.state.lock();
        let user_id = session_user(&state, &request.session_id)?;
        let email = request.credentials.email;
        if state.accounts.contains_key(&email) {
            return Err(ServiceError::Conflict(format!("{email} is already registered")));
        }
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| ServiceError::Internal(format!("dangling user {user_id}")))?;
        if user.password.is_some() {
            return Err(ServiceError::Conflict("user is not a guest".into()));
        }
        user.password = Some(request.credentials.password);
        user.data
            .insert(messages::EMAIL.to_string(), Value::from(email.as_str()));
        let response = UserDataResponse {
            user_data: user.data.clone(),
        };
        state.accounts.insert(email, user_id);
        Ok(response.to_value())
    }

    fn log_out(&self, request: &SessionRequest) -> ServiceResult<Value> {
        match self.state.lock().sessions.remove(&request.session_id) {
            Some(_) => Ok(Value::Null),
            None => Err(ServiceError::AuthenticationFailed("unknown session".into())),
        }
    }

    /// Replays changes in order.
    ///
    /// Entries already applied are acknowledged again without replay.
    /// Entries that fail to apply are acknowledged and dropped. Entries on
    /// deferred fields are left unacknowledged.
    fn synchronize_user(&self, request: SyncRequest) -> ServiceResult<Value> {
        let deferred = self.faults.lock().deferred_fields.clone();
        let mut state = self.state.lock();
        let user_id = session_user(&state, &request.session_id)?;
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| ServiceError::Internal(format!("dangling user {user_id}")))?;

        let mut processed = Vec::new();
        for entry in request.changelog.iter() {
            if deferred.contains(&entry.field) {
                continue;
            }
            if !user.processed.contains(&entry.id) {
                apply_or_drop(entry, &mut user.data);
                user.processed.insert(entry.id.clone());
            }
            processed.push(entry.id.clone());
        }

        Ok(SyncResponse {
            user_data: user.data.clone(),
            processed_changes: processed,
        }
        .to_value())
    }

    fn run_query(&self, params: &Object) -> ServiceResult<Value> {
        let supplied = messages::optional_text(params, messages::MASTER_KEY)?;
        match (&self.master_key, supplied) {
            (Some(expected), Some(given)) if expected == given => {}
            _ => return Err(ServiceError::NotAuthorized("master key required".into())),
        }

        let request = QueryRequest::from_params(params)?;
        let state = self.state.lock();
        let documents = state
            .collections
            .get(request.query.collection())
            .map(Vec::as_slice)
            .unwrap_or_default();
        let result = query::evaluate(&request.query, documents)?;
        Ok(Value::Array(result.into_iter().map(Value::Object).collect()))
    }

    fn run_function(&self, name: &str, request: RunRequest) -> ServiceResult<Value> {
        let (function, user) = {
            let state = self.state.lock();
            let function = state
                .functions
                .get(name)
                .cloned()
                .ok_or_else(|| ServiceError::NotFound(format!("no function named {name}")))?;
            let user = match &request.session_id {
                Some(session_id) => {
                    let user_id = session_user(&state, session_id)?;
                    state.users.get(&user_id).map(|u| u.data.clone())
                }
                None => None,
            };
            (function, user)
        };
        function(user.as_ref(), &request.params)
    }
}

fn session_user(state: &ServiceState, session_id: &str) -> ServiceResult<String> {
    state
        .sessions
        .get(session_id)
        .cloned()
        .ok_or_else(|| ServiceError::AuthenticationFailed("unknown session".into()))
}

fn apply_or_drop(entry: &ChangeLogEntry, data: &mut Object) {
    if let Err(e) = entry.apply(data) {
        debug!(id = %entry.id, error = %e, "dropping change that does not apply");
    }
}

/// Wraps a handler result in a status envelope.
pub fn envelope(result: ServiceResult<Value>) -> Value {
    match result {
        Ok(value) => Value::object([(STATUS, Value::from(STATUS_OK)), (RESULT, value)]),
        Err(e) => Value::object([
            (STATUS, Value::from("error")),
            (CODE, Value::Integer(e.code())),
            (MESSAGE, Value::from(e.to_string())),
        ]),
    }
}

#[async_trait]
impl RequestFunction for MemoryService {
    async fn request(&self, url: &str, params: Value) -> ClientResult<Value> {
        let endpoint = endpoint_of(url).to_string();
        self.calls.lock().push(endpoint.clone());

        let injected = {
            let mut faults = self.faults.lock();
            faults.fail_next.get_mut(&endpoint).and_then(|queue| {
                if queue.is_empty() {
                    None
                } else {
                    Some(queue.remove(0))
                }
            })
        };

        let result = match injected {
            Some(error) => Err(error),
            None => match params.as_object() {
                Some(params) => self.handle(&endpoint, params),
                None => Err(ServiceError::InvalidRequest("params must be an object".into())),
            },
        };

        let lost = {
            let mut faults = self.faults.lock();
            match faults.lose_next.get_mut(&endpoint) {
                Some(pending) if *pending > 0 => {
                    *pending -= 1;
                    true
                }
                _ => false,
            }
        };
        if lost {
            return Err(ClientError::Transport(format!("response from {endpoint} lost")));
        }

        let wire = tether_codec::encode(&envelope(result))?;
        interpret_response(tether_codec::decode(&wire)?)
    }
}

impl fmt::Debug for MemoryService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryService")
            .field("users", &state.users.len())
            .field("sessions", &state.sessions.len())
            .field("functions", &state.functions.len())
            .finish_non_exhaustive()
    }
}
