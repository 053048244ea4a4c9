//! Configuration for the client.

use crate::error::{ClientError, ClientResult};
use crate::transport::RequestFunction;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tether_storage::{InMemoryBackend, StorageBackend};

/// Default namespace for persisted keys.
pub const DEFAULT_KEY_PREFIX: &str = "tether.";

/// Default timeout for the built-in HTTP transport.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration passed to [`crate::Client::initialize`].
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use tether_client::ClientConfig;
///
/// let config = ClientConfig::new("https://api.example.com")
///     .with_master_key("secret")
///     .with_request_timeout(Duration::from_secs(10));
///
/// assert_eq!(config.normalized_server_url().unwrap(), "https://api.example.com/");
/// ```
#[derive(Clone)]
pub struct ClientConfig {
    /// Base URL of the user-data service.
    pub server_url: String,
    /// Carried for collaborators; the client itself does not act on it.
    pub private_mode: bool,
    /// Allows a non-https server URL.
    pub override_ssl_requirement: bool,
    /// Where durable state is kept.
    pub storage: Arc<dyn StorageBackend>,
    /// Elevated key attached to every request when set.
    pub master_key: Option<String>,
    /// Request function; `None` selects the HTTP transport.
    pub request_function: Option<Arc<dyn RequestFunction>>,
    /// Namespace prepended to every persisted key.
    pub key_prefix: String,
    /// Timeout applied by the HTTP transport.
    pub request_timeout: Duration,
}

impl ClientConfig {
    /// Creates a configuration with defaults for everything but the URL.
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            private_mode: false,
            override_ssl_requirement: false,
            storage: Arc::new(InMemoryBackend::new()),
            master_key: None,
            request_function: None,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Sets private mode.
    #[must_use]
    pub fn with_private_mode(mut self, private_mode: bool) -> Self {
        self.private_mode = private_mode;
        self
    }

    /// Allows plain http (for local development).
    #[must_use]
    pub fn with_override_ssl_requirement(mut self, allow: bool) -> Self {
        self.override_ssl_requirement = allow;
        self
    }

    /// Sets the storage backend.
    #[must_use]
    pub fn with_storage(mut self, storage: Arc<dyn StorageBackend>) -> Self {
        self.storage = storage;
        self
    }

    /// Sets the master key.
    #[must_use]
    pub fn with_master_key(mut self, key: impl Into<String>) -> Self {
        self.master_key = Some(key.into());
        self
    }

    /// Sets the request function.
    #[must_use]
    pub fn with_request_function(mut self, function: Arc<dyn RequestFunction>) -> Self {
        self.request_function = Some(function);
        self
    }

    /// Sets the persisted key namespace.
    #[must_use]
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Sets the HTTP request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Validates the server URL and returns it with a trailing `/`.
    ///
    /// # Errors
    ///
    /// Returns `SslRequired` if the URL is not https and the override is off.
    pub fn normalized_server_url(&self) -> ClientResult<String> {
        let secure = self
            .server_url
            .get(..8)
            .is_some_and(|scheme| scheme.eq_ignore_ascii_case("https://"));
        if !secure && !self.override_ssl_requirement {
            return Err(ClientError::SslRequired {
                url: self.server_url.clone(),
            });
        }

        let mut url = self.server_url.clone();
        if !url.ends_with('/') {
            url.push('/');
        }
        Ok(url)
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("server_url", &self.server_url)
            .field("private_mode", &self.private_mode)
            .field("override_ssl_requirement", &self.override_ssl_requirement)
            .field("master_key", &self.master_key.as_ref().map(|_| "<redacted>"))
            .field("custom_request_function", &self.request_function.is_some())
            .field("key_prefix", &self.key_prefix)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}
