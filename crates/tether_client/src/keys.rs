//! Persisted key names.

/// The four keys that make up the client's durable state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKeys {
    /// Per-device installation id.
    pub installation_id: String,
    /// Current session id.
    pub session_id: String,
    /// User snapshot.
    pub user_data: String,
    /// Pending changes.
    pub user_changelog: String,
}

impl StorageKeys {
    /// Builds the key set under `prefix`.
    pub fn new(prefix: &str) -> Self {
        Self {
            installation_id: format!("{prefix}installationId"),
            session_id: format!("{prefix}sessionId"),
            user_data: format!("{prefix}userData"),
            user_changelog: format!("{prefix}userChangelog"),
        }
    }

    /// The keys holding the logged-in identity, in write order.
    pub fn identity(&self) -> [&str; 3] {
        [
            self.session_id.as_str(),
            self.user_data.as_str(),
            self.user_changelog.as_str(),
        ]
    }
}
