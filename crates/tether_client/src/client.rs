//! The client: session state machine, synchronization and request dispatch.

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::http::HttpTransport;
use crate::keys::StorageKeys;
use crate::session::{ClientState, LogoutOutcome, Session, SyncOutcome};
use crate::transport::RequestFunction;
use crate::user::UserHandle;
use std::fmt;
use std::sync::Arc;
use tether_codec::{Object, Value};
use tether_protocol::messages::{
    self, endpoint, ConvertRequest, Credentials, QueryRequest, RunRequest, SessionRequest,
    SessionResponse, SyncRequest, SyncResponse, UserDataResponse,
};
use tether_protocol::{Changelog, Query};
use tether_storage::{Primitive, StorageBridge, StorageError};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A Tether client.
///
/// A client starts uninitialized; every operation other than
/// [`initialize`](Self::initialize) fails with
/// [`ClientError::Uninitialized`] until it succeeds. Once initialized the
/// client is either logged out or holds exactly one session.
///
/// Operations that change the session take `&mut self`, so they cannot
/// overlap. Dropping the client discards in-memory state; a new client
/// initialized on the same storage picks up where it left off.
///
/// # Example
///
/// ```no_run
/// use tether_client::{Client, ClientConfig};
///
/// # async fn demo() -> tether_client::ClientResult<()> {
/// let mut client = Client::connect(ClientConfig::new("https://api.example.com")).await?;
/// client.log_in_as_guest().await?;
///
/// if let Some(mut user) = client.current_user()? {
///     user.set("name", "Ada");
/// }
/// client.synchronize_user().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Default)]
pub struct Client {
    engine: Option<Engine>,
}

impl Client {
    /// Creates an uninitialized client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates and initializes a client.
    ///
    /// # Errors
    ///
    /// See [`initialize`](Self::initialize).
    pub async fn connect(config: ClientConfig) -> ClientResult<Self> {
        let mut client = Self::new();
        client.initialize(config).await?;
        Ok(client)
    }

    /// Initializes the client.
    ///
    /// Validates the configuration, then loads (or on first run creates)
    /// the installation id and any persisted session. A persisted session
    /// missing one of its parts is discarded and the client starts logged
    /// out.
    ///
    /// # Errors
    ///
    /// - `AlreadyInitialized` if called twice; the client is unchanged
    /// - `SslRequired` if the server URL is not https without the override
    /// - `Storage` if the storage backend fails
    pub async fn initialize(&mut self, config: ClientConfig) -> ClientResult<()> {
        if self.engine.is_some() {
            return Err(ClientError::AlreadyInitialized);
        }
        let engine = Engine::load(config).await?;
        info!(
            server = %engine.server_url,
            logged_in = engine.session.is_some(),
            "client initialized"
        );
        self.engine = Some(engine);
        Ok(())
    }

    fn engine(&self) -> ClientResult<&Engine> {
        self.engine.as_ref().ok_or(ClientError::Uninitialized)
    }

    fn engine_mut(&mut self) -> ClientResult<&mut Engine> {
        self.engine.as_mut().ok_or(ClientError::Uninitialized)
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> ClientState {
        match &self.engine {
            None => ClientState::Uninitialized,
            Some(engine) if engine.session.is_some() => ClientState::LoggedIn,
            Some(_) => ClientState::LoggedOut,
        }
    }

    /// Returns the per-device installation id.
    ///
    /// # Errors
    ///
    /// Returns `Uninitialized` before initialization.
    pub fn installation_id(&self) -> ClientResult<&str> {
        Ok(&self.engine()?.installation_id)
    }

    /// Returns the normalized server URL.
    ///
    /// # Errors
    ///
    /// Returns `Uninitialized` before initialization.
    pub fn server_url(&self) -> ClientResult<&str> {
        Ok(&self.engine()?.server_url)
    }

    /// Returns the configured private mode flag.
    ///
    /// # Errors
    ///
    /// Returns `Uninitialized` before initialization.
    pub fn private_mode(&self) -> ClientResult<bool> {
        Ok(self.engine()?.private_mode)
    }

    /// Returns a handle on the logged-in user, or `None` when logged out.
    ///
    /// # Errors
    ///
    /// Returns `Uninitialized` before initialization.
    pub fn current_user(&mut self) -> ClientResult<Option<UserHandle<'_>>> {
        Ok(self.engine_mut()?.session.as_mut().map(UserHandle::new))
    }

    /// Logs in as a new anonymous guest.
    ///
    /// # Errors
    ///
    /// Returns `StillLoggedIn` without a network call if a user is logged
    /// in; otherwise propagates transport and server errors.
    pub async fn log_in_as_guest(&mut self) -> ClientResult<()> {
        self.engine_mut()?
            .open_session(endpoint::LOG_IN_AS_GUEST, Object::new())
            .await
    }

    /// Creates an account and logs in.
    ///
    /// # Errors
    ///
    /// Same as [`log_in_as_guest`](Self::log_in_as_guest).
    pub async fn sign_up(&mut self, email: &str, password: &str) -> ClientResult<()> {
        let params = Credentials::new(email, password).to_params();
        self.engine_mut()?
            .open_session(endpoint::SIGN_UP, params)
            .await
    }

    /// Logs in with existing credentials.
    ///
    /// # Errors
    ///
    /// Same as [`log_in_as_guest`](Self::log_in_as_guest).
    pub async fn log_in(&mut self, email: &str, password: &str) -> ClientResult<()> {
        let params = Credentials::new(email, password).to_params();
        self.engine_mut()?.open_session(endpoint::LOG_IN, params).await
    }

    /// Attaches credentials to the current guest user.
    ///
    /// Pending changes are synchronized first. On success only the
    /// snapshot is replaced; the session id is kept.
    ///
    /// # Errors
    ///
    /// Returns `NotLoggedIn` when logged out; otherwise propagates errors
    /// from the synchronization or the conversion call.
    pub async fn convert_guest_user(&mut self, email: &str, password: &str) -> ClientResult<()> {
        self.engine_mut()?.convert_guest_user(email, password).await
    }

    /// Synchronizes pending changes, asks the server to end the session,
    /// then clears the local session.
    ///
    /// If synchronization fails nothing is cleared and the error is
    /// returned. If only the invalidation call fails, local state is still
    /// cleared and the outcome is [`LogoutOutcome::Unacknowledged`].
    ///
    /// # Errors
    ///
    /// Returns `NotLoggedIn` without a network call when logged out.
    pub async fn log_out(&mut self) -> ClientResult<LogoutOutcome> {
        self.engine_mut()?.log_out().await
    }

    /// Clears the local session without contacting the server.
    ///
    /// Succeeds when already logged out.
    ///
    /// # Errors
    ///
    /// Returns `Uninitialized` before initialization, or `Storage` if the
    /// persisted keys cannot be removed.
    pub async fn force_log_out(&mut self) -> ClientResult<()> {
        let engine = self.engine_mut()?;
        let was_logged_in = engine.session.is_some();
        engine.clear_session().await?;
        if was_logged_in {
            info!("forced local log-out");
        }
        Ok(())
    }

    /// Sends pending changes and merges back the server's snapshot.
    ///
    /// The snapshot is replaced wholesale and every entry the server
    /// reports as processed is dropped; the rest stay queued in order and
    /// are resent by the next call. Succeeds trivially when logged out.
    ///
    /// # Errors
    ///
    /// Transport and server errors propagate unchanged and leave local
    /// state untouched.
    pub async fn synchronize_user(&mut self) -> ClientResult<SyncOutcome> {
        self.engine_mut()?.synchronize().await
    }

    /// Persists the snapshot and changelog without a network call.
    ///
    /// Local edits survive a restart once saved. Does nothing when logged
    /// out.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the writes fail.
    pub async fn save_user(&mut self) -> ClientResult<()> {
        let engine = self.engine()?;
        engine.persist_snapshot().await?;
        engine.persist_changelog().await
    }

    /// Calls the custom function `name` with `params`.
    ///
    /// The request carries the session id, or null when logged out.
    ///
    /// # Errors
    ///
    /// Returns `NonAlphanumericFunctionName` before any network call if
    /// `name` is empty or not ASCII alphanumeric, and
    /// `ReservedFunctionName` if it names a built-in endpoint such as
    /// `logOut`.
    pub async fn run(&self, name: &str, params: Object) -> ClientResult<Value> {
        let engine = self.engine()?;
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ClientError::NonAlphanumericFunctionName {
                name: name.to_string(),
            });
        }
        if endpoint::ALL.contains(&name) {
            return Err(ClientError::ReservedFunctionName {
                name: name.to_string(),
            });
        }
        let request = RunRequest {
            session_id: engine.session.as_ref().map(|s| s.session_id.clone()),
            params,
        };
        engine.dispatch(name, request.to_params()).await
    }

    /// Runs a structural query. Requires a master key.
    ///
    /// # Errors
    ///
    /// Returns `MasterKeyRequired` before any network call if no master
    /// key is configured.
    pub async fn run_query(&self, query: &Query) -> ClientResult<Value> {
        let engine = self.engine()?;
        if engine.master_key.is_none() {
            return Err(ClientError::MasterKeyRequired);
        }
        let request = QueryRequest {
            query: query.clone(),
        };
        engine
            .dispatch(endpoint::RUN_QUERY, request.to_params())
            .await
    }
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Initialized client state.
struct Engine {
    server_url: String,
    private_mode: bool,
    master_key: Option<String>,
    transport: Arc<dyn RequestFunction>,
    storage: StorageBridge,
    keys: StorageKeys,
    installation_id: String,
    session: Option<Session>,
}

impl Engine {
    async fn load(config: ClientConfig) -> ClientResult<Self> {
        let server_url = config.normalized_server_url()?;
        let transport: Arc<dyn RequestFunction> = match config.request_function {
            Some(function) => function,
            None => Arc::new(HttpTransport::new(config.request_timeout)?),
        };
        let storage = StorageBridge::new(config.storage);
        let keys = StorageKeys::new(&config.key_prefix);

        let installation_id = load_installation_id(&storage, &keys).await?;
        let session = load_session(&storage, &keys).await?;

        Ok(Self {
            server_url,
            private_mode: config.private_mode,
            master_key: config.master_key,
            transport,
            storage,
            keys,
            installation_id,
            session,
        })
    }

    /// Sends `params` to `endpoint` with the installation id and master
    /// key attached.
    async fn dispatch(&self, endpoint: &str, mut params: Object) -> ClientResult<Value> {
        params.insert(
            messages::INSTALLATION_ID.to_string(),
            Value::from(self.installation_id.as_str()),
        );
        if let Some(key) = &self.master_key {
            params.insert(messages::MASTER_KEY.to_string(), Value::from(key.as_str()));
        }

        let url = format!("{}{endpoint}", self.server_url);
        debug!(%url, "dispatching request");
        let result = self.transport.request(&url, Value::Object(params)).await;
        if let Err(e) = &result {
            debug!(endpoint, error = %e, "request failed");
        }
        result
    }

    async fn open_session(&mut self, endpoint: &str, params: Object) -> ClientResult<()> {
        if self.session.is_some() {
            return Err(ClientError::StillLoggedIn);
        }

        let result = self.dispatch(endpoint, params).await?;
        let response = SessionResponse::from_value(&result)?;

        self.session = Some(Session::open(response.session_id, response.user_data));
        self.persist_session().await?;
        info!(endpoint, "logged in");
        Ok(())
    }

    async fn synchronize(&mut self) -> ClientResult<SyncOutcome> {
        let Some(session) = &self.session else {
            return Ok(SyncOutcome::default());
        };
        let request = SyncRequest {
            session_id: session.session_id.clone(),
            changelog: session.changelog.clone(),
        };
        let sent = request.changelog.len();
        debug!(pending = sent, "synchronizing user");

        let result = self
            .dispatch(endpoint::SYNCHRONIZE_USER, request.to_params())
            .await?;
        let response = SyncResponse::from_value(&result)?;

        let session = self.session.as_mut().ok_or(ClientError::NotLoggedIn)?;
        session.snapshot = response.user_data;
        let processed = session
            .changelog
            .prune(response.processed_changes.iter().map(String::as_str));
        let remaining = session.changelog.len();

        self.persist_snapshot().await?;
        self.persist_changelog().await?;

        debug!(sent, processed, remaining, "synchronized user");
        Ok(SyncOutcome {
            sent,
            processed,
            remaining,
        })
    }

    async fn log_out(&mut self) -> ClientResult<LogoutOutcome> {
        if self.session.is_none() {
            return Err(ClientError::NotLoggedIn);
        }
        self.synchronize().await?;

        let session_id = self.session_id()?;
        let request = SessionRequest { session_id };
        let outcome = match self.dispatch(endpoint::LOG_OUT, request.to_params()).await {
            Ok(_) => LogoutOutcome::Acknowledged,
            Err(e) => {
                warn!(error = %e, "log-out not acknowledged by server, clearing local session");
                LogoutOutcome::Unacknowledged {
                    reason: e.to_string(),
                }
            }
        };

        self.clear_session().await?;
        info!(acknowledged = outcome.is_acknowledged(), "logged out");
        Ok(outcome)
    }

    async fn convert_guest_user(&mut self, email: &str, password: &str) -> ClientResult<()> {
        if self.session.is_none() {
            return Err(ClientError::NotLoggedIn);
        }
        self.synchronize().await?;

        let request = ConvertRequest {
            session_id: self.session_id()?,
            credentials: Credentials::new(email, password),
        };
        let result = self
            .dispatch(endpoint::CONVERT_GUEST_USER, request.to_params())
            .await?;
        let response = UserDataResponse::from_value(&result)?;

        let session = self.session.as_mut().ok_or(ClientError::NotLoggedIn)?;
        session.snapshot = response.user_data;
        self.persist_snapshot().await?;
        info!("converted guest user");
        Ok(())
    }

    fn session_id(&self) -> ClientResult<String> {
        self.session
            .as_ref()
            .map(|s| s.session_id.clone())
            .ok_or(ClientError::NotLoggedIn)
    }

    async fn persist_session(&self) -> ClientResult<()> {
        let Some(session) = &self.session else {
            return Ok(());
        };
        self.storage
            .set_primitive(
                &self.keys.session_id,
                &Primitive::Text(session.session_id.clone()),
            )
            .await?;
        self.persist_snapshot().await?;
        self.persist_changelog().await
    }

    async fn persist_snapshot(&self) -> ClientResult<()> {
        if let Some(session) = &self.session {
            self.storage
                .set_object(&self.keys.user_data, &Value::Object(session.snapshot.clone()))
                .await?;
        }
        Ok(())
    }

    async fn persist_changelog(&self) -> ClientResult<()> {
        if let Some(session) = &self.session {
            self.storage
                .set_object(&self.keys.user_changelog, &session.changelog.to_value())
                .await?;
        }
        Ok(())
    }

    /// Drops the session from memory, then from storage.
    async fn clear_session(&mut self) -> ClientResult<()> {
        self.session = None;
        for key in self.keys.identity() {
            self.storage.remove(key).await?;
        }
        Ok(())
    }
}

async fn load_installation_id(storage: &StorageBridge, keys: &StorageKeys) -> ClientResult<String> {
    match storage.get_primitive(&keys.installation_id).await? {
        Some(Primitive::Text(id)) => Ok(id),
        Some(other) => Err(StorageError::TypeMismatch {
            key: keys.installation_id.clone(),
            expected: "text",
            found: other.type_name(),
        }
        .into()),
        None => {
            let id = Uuid::new_v4().to_string();
            storage
                .set_primitive(&keys.installation_id, &Primitive::Text(id.clone()))
                .await?;
            info!(installation_id = %id, "generated installation id");
            Ok(id)
        }
    }
}

/// Reads a persisted value.
///
/// The outer option is whether the key exists; the inner one whether its
/// content is usable.
async fn read_slot<T>(
    storage: &StorageBridge,
    key: &str,
    parse: impl FnOnce(Value) -> Option<T>,
) -> ClientResult<Option<Option<T>>> {
    match storage.get_object(key).await {
        Ok(None) => Ok(None),
        Ok(Some(value)) => Ok(Some(parse(value))),
        Err(StorageError::Codec { .. }) => Ok(Some(None)),
        Err(e) => Err(e.into()),
    }
}

async fn load_session(storage: &StorageBridge, keys: &StorageKeys) -> ClientResult<Option<Session>> {
    let session_id = read_slot(storage, &keys.session_id, |v| match v {
        Value::Text(id) => Some(id),
        _ => None,
    })
    .await?;
    let snapshot = read_slot(storage, &keys.user_data, Value::into_object).await?;
    let changelog = read_slot(storage, &keys.user_changelog, |v| {
        Changelog::from_value(&v).ok()
    })
    .await?;

    match (session_id, snapshot, changelog) {
        (Some(Some(session_id)), Some(Some(snapshot)), Some(Some(changelog))) => {
            debug!(pending = changelog.len(), "restored session");
            Ok(Some(Session {
                session_id,
                snapshot,
                changelog,
            }))
        }
        (None, None, None) => Ok(None),
        (session_id, snapshot, changelog) => {
            warn!(
                session_id = ?session_id.as_ref().map(Option::is_some),
                user_data = ?snapshot.as_ref().map(Option::is_some),
                user_changelog = ?changelog.as_ref().map(Option::is_some),
                "discarding incomplete persisted session"
            );
            for key in keys.identity() {
                storage.remove(key).await?;
            }
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use tether_protocol::ChangeKind;
    use tether_storage::{InMemoryBackend, StorageBackend};

    const URL: &str = "https://x.test/";

    fn session_result(session_id: &str, user_data: Object) -> Value {
        SessionResponse {
            session_id: session_id.into(),
            user_data,
        }
        .to_value()
    }

    fn sync_result(user_data: Object, processed: &[&str]) -> Value {
        SyncResponse {
            user_data,
            processed_changes: processed.iter().map(|s| s.to_string()).collect(),
        }
        .to_value()
    }

    fn object(pairs: &[(&str, Value)]) -> Object {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    async fn client_with(
        mock: &Arc<MockTransport>,
        storage: &Arc<InMemoryBackend>,
    ) -> Client {
        let config = ClientConfig::new(URL)
            .with_request_function(mock.clone())
            .with_storage(storage.clone());
        Client::connect(config).await.unwrap()
    }

    async fn client() -> (Client, Arc<MockTransport>, Arc<InMemoryBackend>) {
        let mock = Arc::new(MockTransport::new());
        let storage = Arc::new(InMemoryBackend::new());
        let client = client_with(&mock, &storage).await;
        (client, mock, storage)
    }

    async fn logged_in() -> (Client, Arc<MockTransport>, Arc<InMemoryBackend>) {
        let (mut client, mock, storage) = client().await;
        mock.push_response(endpoint::LOG_IN_AS_GUEST, session_result("s1", Object::new()));
        client.log_in_as_guest().await.unwrap();
        (client, mock, storage)
    }

    #[tokio::test]
    async fn uninitialized_operations_fail() {
        let mut client = Client::new();
        assert_eq!(client.state(), ClientState::Uninitialized);
        assert!(matches!(client.installation_id(), Err(ClientError::Uninitialized)));
        assert!(matches!(client.current_user(), Err(ClientError::Uninitialized)));
        assert!(matches!(
            client.log_in_as_guest().await,
            Err(ClientError::Uninitialized)
        ));
        assert!(matches!(
            client.synchronize_user().await,
            Err(ClientError::Uninitialized)
        ));
        assert!(matches!(
            client.run("fn", Object::new()).await,
            Err(ClientError::Uninitialized)
        ));
        assert!(matches!(
            client.force_log_out().await,
            Err(ClientError::Uninitialized)
        ));
    }

    #[tokio::test]
    async fn initialize_twice_fails_without_effect() {
        let (mut client, _mock, _) = client().await;
        let id = client.installation_id().unwrap().to_string();

        let other = ClientConfig::new("https://other.test")
            .with_request_function(Arc::new(MockTransport::new()));
        assert!(matches!(
            client.initialize(other).await,
            Err(ClientError::AlreadyInitialized)
        ));
        assert_eq!(client.installation_id().unwrap(), id);
        assert_eq!(client.server_url().unwrap(), URL);
    }

    #[tokio::test]
    async fn insecure_url_rejected() {
        let mut client = Client::new();
        let config = ClientConfig::new("http://x.test")
            .with_request_function(Arc::new(MockTransport::new()));
        assert!(matches!(
            client.initialize(config).await,
            Err(ClientError::SslRequired { .. })
        ));
        assert_eq!(client.state(), ClientState::Uninitialized);
    }

    #[tokio::test]
    async fn installation_id_is_stable() {
        let mock = Arc::new(MockTransport::new());
        let storage = Arc::new(InMemoryBackend::new());

        let first = client_with(&mock, &storage).await;
        let id = first.installation_id().unwrap().to_string();
        drop(first);

        let second = client_with(&mock, &storage).await;
        assert_eq!(second.installation_id().unwrap(), id);
        assert_eq!(
            storage.get_item("tether.installationId").await.unwrap(),
            Some(format!("\"{id}\""))
        );
    }

    #[tokio::test]
    async fn guest_set_sync_scenario() {
        let (mut client, mock, storage) = logged_in().await;
        assert_eq!(client.state(), ClientState::LoggedIn);

        {
            let mut user = client.current_user().unwrap().unwrap();
            assert_eq!(user.fields().count(), 0);
            assert_eq!(user.pending_changes(), 0);
            user.set("name", "Ada");
            assert_eq!(user.get("name"), Some(&Value::from("Ada")));
            assert_eq!(user.pending_changes(), 1);
        }

        // nothing queued: the attempt fails but records the outgoing changelog
        assert!(client.synchronize_user().await.is_err());
        let entry_id = mock.calls_to(endpoint::SYNCHRONIZE_USER)[0]
            .get("changelog")
            .and_then(Value::as_array)
            .and_then(|entries| entries[0].get("id"))
            .and_then(Value::as_text)
            .unwrap()
            .to_string();

        let server_user = object(&[("name", Value::from("Ada"))]);
        mock.push_response(
            endpoint::SYNCHRONIZE_USER,
            sync_result(server_user.clone(), &[entry_id.as_str()]),
        );
        let outcome = client.synchronize_user().await.unwrap();
        assert_eq!(
            outcome,
            SyncOutcome {
                sent: 1,
                processed: 1,
                remaining: 0
            }
        );

        let calls = mock.calls_to(endpoint::SYNCHRONIZE_USER);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], calls[1]);
        assert_eq!(calls[1].get("sessionId"), Some(&Value::from("s1")));
        assert!(calls[1].get("installationId").is_some());

        let user = client.current_user().unwrap().unwrap();
        assert_eq!(user.pending_changes(), 0);
        assert_eq!(user.get("name"), Some(&Value::from("Ada")));

        let stored = storage.get_item("tether.userData").await.unwrap().unwrap();
        assert_eq!(stored, r#"{"name":"Ada"}"#);
        assert_eq!(
            storage.get_item("tether.userChangelog").await.unwrap().as_deref(),
            Some("[]")
        );
    }

    #[tokio::test]
    async fn sync_prunes_only_processed() {
        let (mut client, mock, _) = logged_in().await;
        let ids: Vec<String> = {
            let mut user = client.current_user().unwrap().unwrap();
            ["a", "b", "c"]
                .iter()
                .map(|f| user.append_change(ChangeKind::Increment, f, 1))
                .collect()
        };

        let server_user = object(&[("server", Value::Bool(true))]);
        mock.push_response(
            endpoint::SYNCHRONIZE_USER,
            sync_result(server_user, &[ids[0].as_str(), ids[2].as_str()]),
        );
        let outcome = client.synchronize_user().await.unwrap();
        assert_eq!(outcome.processed, 2);
        assert_eq!(outcome.remaining, 1);

        let user = client.current_user().unwrap().unwrap();
        assert_eq!(user.pending_changes(), 1);
        assert_eq!(user.get("server"), Some(&Value::Bool(true)));
        assert_eq!(user.get("a"), None);
    }

    #[tokio::test]
    async fn sync_failure_leaves_state() {
        let (mut client, mock, _) = logged_in().await;
        client.current_user().unwrap().unwrap().set("name", "Ada");

        mock.push_error(endpoint::SYNCHRONIZE_USER, ClientError::Transport("offline".into()));
        let err = client.synchronize_user().await.unwrap_err();
        assert!(err.is_retryable());

        let user = client.current_user().unwrap().unwrap();
        assert_eq!(user.pending_changes(), 1);
        assert_eq!(user.get("name"), Some(&Value::from("Ada")));
    }

    #[tokio::test]
    async fn sync_when_logged_out_is_noop() {
        let (mut client, mock, _) = client().await;
        assert_eq!(client.synchronize_user().await.unwrap(), SyncOutcome::default());
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn log_in_guard_precedes_network() {
        let (mut client, mock, _) = logged_in().await;
        let calls = mock.call_count();

        assert!(matches!(
            client.sign_up("a@b.c", "pw").await,
            Err(ClientError::StillLoggedIn)
        ));
        assert!(matches!(
            client.log_in("a@b.c", "pw").await,
            Err(ClientError::StillLoggedIn)
        ));
        assert!(matches!(
            client.log_in_as_guest().await,
            Err(ClientError::StillLoggedIn)
        ));
        assert_eq!(mock.call_count(), calls);
    }

    #[tokio::test]
    async fn log_in_sends_credentials() {
        let (mut client, mock, _) = client().await;
        mock.push_response(
            endpoint::LOG_IN,
            session_result("s9", object(&[("email", Value::from("a@b.c"))])),
        );
        client.log_in("a@b.c", "pw").await.unwrap();

        let sent = &mock.calls_to(endpoint::LOG_IN)[0];
        assert_eq!(sent.get("email"), Some(&Value::from("a@b.c")));
        assert_eq!(sent.get("password"), Some(&Value::from("pw")));
        assert_eq!(
            client.current_user().unwrap().unwrap().session_id(),
            "s9"
        );
    }

    #[tokio::test]
    async fn malformed_log_in_response_keeps_logged_out() {
        let (mut client, mock, storage) = client().await;
        mock.push_response(endpoint::LOG_IN_AS_GUEST, Value::from("nonsense"));

        assert!(matches!(
            client.log_in_as_guest().await,
            Err(ClientError::Protocol(_))
        ));
        assert_eq!(client.state(), ClientState::LoggedOut);
        assert_eq!(storage.keys(), vec!["tether.installationId".to_string()]);
    }

    #[tokio::test]
    async fn log_out_clears_even_when_unacknowledged() {
        let (mut client, mock, storage) = logged_in().await;
        mock.push_response(endpoint::SYNCHRONIZE_USER, sync_result(Object::new(), &[]));
        mock.push_error(
            endpoint::LOG_OUT,
            ClientError::Server {
                code: 500,
                message: "boom".into(),
            },
        );

        let outcome = client.log_out().await.unwrap();
        assert!(matches!(outcome, LogoutOutcome::Unacknowledged { .. }));
        assert_eq!(client.state(), ClientState::LoggedOut);
        assert_eq!(storage.keys(), vec!["tether.installationId".to_string()]);
    }

    #[tokio::test]
    async fn log_out_aborts_when_sync_fails() {
        let (mut client, mock, _) = logged_in().await;
        mock.push_error(endpoint::SYNCHRONIZE_USER, ClientError::Transport("offline".into()));

        assert!(client.log_out().await.is_err());
        assert_eq!(client.state(), ClientState::LoggedIn);
        assert!(mock.calls_to(endpoint::LOG_OUT).is_empty());
    }

    #[tokio::test]
    async fn log_out_requires_session() {
        let (mut client, mock, _) = client().await;
        assert!(matches!(client.log_out().await, Err(ClientError::NotLoggedIn)));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn force_log_out_is_local() {
        let (mut client, mock, storage) = logged_in().await;
        let calls = mock.call_count();

        client.force_log_out().await.unwrap();
        assert_eq!(client.state(), ClientState::LoggedOut);
        assert_eq!(mock.call_count(), calls);
        assert_eq!(storage.len(), 1);

        client.force_log_out().await.unwrap();
    }

    #[tokio::test]
    async fn convert_replaces_snapshot_only() {
        let (mut client, mock, storage) = logged_in().await;
        mock.push_response(endpoint::SYNCHRONIZE_USER, sync_result(Object::new(), &[]));
        mock.push_response(
            endpoint::CONVERT_GUEST_USER,
            UserDataResponse {
                user_data: object(&[("email", Value::from("a@b.c"))]),
            }
            .to_value(),
        );

        client.convert_guest_user("a@b.c", "pw").await.unwrap();

        let sent = &mock.calls_to(endpoint::CONVERT_GUEST_USER)[0];
        assert_eq!(sent.get("sessionId"), Some(&Value::from("s1")));
        let user = client.current_user().unwrap().unwrap();
        assert_eq!(user.session_id(), "s1");
        assert_eq!(user.get("email"), Some(&Value::from("a@b.c")));
        assert_eq!(
            storage.get_item("tether.userData").await.unwrap().as_deref(),
            Some(r#"{"email":"a@b.c"}"#)
        );
    }

    #[tokio::test]
    async fn convert_requires_session() {
        let (mut client, _, _) = client().await;
        assert!(matches!(
            client.convert_guest_user("a@b.c", "pw").await,
            Err(ClientError::NotLoggedIn)
        ));
    }

    #[tokio::test]
    async fn run_validates_name() {
        let (client, mock, _) = client().await;
        for bad in ["bad name!", "", "a/b", "über"] {
            assert!(matches!(
                client.run(bad, Object::new()).await,
                Err(ClientError::NonAlphanumericFunctionName { .. })
            ));
        }
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn run_refuses_built_in_endpoints() {
        let (client, mock, _) = logged_in().await;
        let before = mock.call_count();
        for name in endpoint::ALL {
            assert!(matches!(
                client.run(name, Object::new()).await,
                Err(ClientError::ReservedFunctionName { .. })
            ));
        }
        assert_eq!(mock.call_count(), before);
        assert_eq!(client.state(), ClientState::LoggedIn);
    }

    #[tokio::test]
    async fn run_dispatches_session_and_params() {
        let (client, mock, _) = logged_in().await;
        mock.push_response("validName", Value::from(7));

        let params = object(&[("x", Value::from(1))]);
        let result = client.run("validName", params.clone()).await.unwrap();
        assert_eq!(result, Value::from(7));

        let call = mock.calls().pop().unwrap();
        assert_eq!(call.url, "https://x.test/validName");
        assert_eq!(call.params.get("sessionId"), Some(&Value::from("s1")));
        assert_eq!(call.params.get("params"), Some(&Value::Object(params)));
    }

    #[tokio::test]
    async fn run_when_logged_out_sends_null_session() {
        let (client, mock, _) = client().await;
        mock.push_response("ping", Value::Null);
        client.run("ping", Object::new()).await.unwrap();
        assert_eq!(
            mock.calls_to("ping")[0].get("sessionId"),
            Some(&Value::Null)
        );
    }

    #[tokio::test]
    async fn run_query_requires_master_key() {
        let (client, mock, _) = client().await;
        assert!(matches!(
            client.run_query(&Query::new("users")).await,
            Err(ClientError::MasterKeyRequired)
        ));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn run_query_forwards_record_and_key() {
        let mock = Arc::new(MockTransport::new());
        let config = ClientConfig::new(URL)
            .with_request_function(mock.clone())
            .with_master_key("mk");
        let client = Client::connect(config).await.unwrap();

        let query = Query::new("users").eq("name", "Ada").with_limit(1);
        mock.push_response(endpoint::RUN_QUERY, Value::Array(vec![]));
        client.run_query(&query).await.unwrap();

        let sent = &mock.calls_to(endpoint::RUN_QUERY)[0];
        assert_eq!(sent.get("query"), Some(&query.to_value()));
        assert_eq!(sent.get("masterKey"), Some(&Value::from("mk")));
    }

    #[tokio::test]
    async fn session_survives_restart() {
        let mock = Arc::new(MockTransport::new());
        let storage = Arc::new(InMemoryBackend::new());
        {
            let mut client = client_with(&mock, &storage).await;
            mock.push_response(endpoint::LOG_IN_AS_GUEST, session_result("s1", Object::new()));
            client.log_in_as_guest().await.unwrap();
            client.current_user().unwrap().unwrap().set("draft", "x");
            client.save_user().await.unwrap();
        }

        let mut client = client_with(&mock, &storage).await;
        assert_eq!(client.state(), ClientState::LoggedIn);
        let user = client.current_user().unwrap().unwrap();
        assert_eq!(user.session_id(), "s1");
        assert_eq!(user.get("draft"), Some(&Value::from("x")));
        assert_eq!(user.pending_changes(), 1);
    }

    #[tokio::test]
    async fn torn_session_is_discarded() {
        let storage = Arc::new(InMemoryBackend::with_items([
            ("tether.installationId", "\"device\""),
            ("tether.sessionId", "\"s1\""),
            ("tether.userData", "{}"),
        ]));
        let mock = Arc::new(MockTransport::new());

        let client = client_with(&mock, &storage).await;
        assert_eq!(client.state(), ClientState::LoggedOut);
        assert_eq!(client.installation_id().unwrap(), "device");
        assert_eq!(storage.keys(), vec!["tether.installationId".to_string()]);
    }

    #[tokio::test]
    async fn unreadable_changelog_is_discarded() {
        let storage = Arc::new(InMemoryBackend::with_items([
            ("tether.sessionId", "\"s1\""),
            ("tether.userData", "{}"),
            ("tether.userChangelog", "{broken"),
        ]));
        let mock = Arc::new(MockTransport::new());

        let client = client_with(&mock, &storage).await;
        assert_eq!(client.state(), ClientState::LoggedOut);
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn key_prefix_namespaces_storage() {
        let storage = Arc::new(InMemoryBackend::new());
        let config = ClientConfig::new(URL)
            .with_request_function(Arc::new(MockTransport::new()))
            .with_storage(storage.clone())
            .with_key_prefix("app.");
        Client::connect(config).await.unwrap();
        assert_eq!(storage.keys(), vec!["app.installationId".to_string()]);
    }
}
