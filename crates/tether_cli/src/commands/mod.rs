//! CLI command implementations.

pub mod remote;
pub mod session;
pub mod user;

use std::path::PathBuf;
use std::sync::Arc;
use tether_client::{Client, ClientConfig, Value};
use tether_storage::FileBackend;

/// Result type shared by every command.
pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Global options needed to build a client.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Server URL.
    pub server: String,
    /// Local store file.
    pub store: PathBuf,
    /// Allow a non-https server.
    pub insecure: bool,
    /// Master key, if any.
    pub master_key: Option<String>,
}

impl ConnectOptions {
    /// Builds the client configuration over `storage`.
    pub fn config(&self, storage: Arc<FileBackend>) -> ClientConfig {
        let config = ClientConfig::new(self.server.as_str())
            .with_override_ssl_requirement(self.insecure)
            .with_storage(storage);
        match &self.master_key {
            Some(key) => config.with_master_key(key.as_str()),
            None => config,
        }
    }
}

/// Opens the store and initializes a client.
pub async fn connect(options: &ConnectOptions) -> Result<Client, Box<dyn std::error::Error>> {
    let storage = Arc::new(FileBackend::open_with_create_dirs(&options.store)?);
    tracing::debug!(store = %options.store.display(), "opened local store");
    Ok(Client::connect(options.config(storage)).await?)
}

/// Parses a command-line value as JSON, falling back to plain text.
pub fn parse_value(text: &str) -> Value {
    tether_codec::decode(text).unwrap_or_else(|_| Value::Text(text.to_string()))
}

/// Prints a value as pretty JSON.
pub fn print_value(value: &Value) -> CommandResult {
    println!("{}", serde_json::to_string_pretty(&tether_codec::to_json(value))?);
    Ok(())
}
