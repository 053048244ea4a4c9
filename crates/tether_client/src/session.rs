//! Session state and operation outcomes.

use tether_codec::Object;
use tether_protocol::Changelog;

/// Where the client is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// `initialize` has not succeeded yet.
    Uninitialized,
    /// Initialized with no user.
    LoggedOut,
    /// Initialized with a user.
    LoggedIn,
}

impl ClientState {
    /// Returns true if a user is logged in.
    pub fn is_logged_in(&self) -> bool {
        matches!(self, ClientState::LoggedIn)
    }
}

/// The logged-in identity.
///
/// Session id, snapshot and changelog only exist together: a client holds
/// `Option<Session>`, so there is no state with one of them missing.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Session {
    pub(crate) session_id: String,
    pub(crate) snapshot: Object,
    pub(crate) changelog: Changelog,
}

impl Session {
    /// A freshly opened session with nothing pending.
    pub(crate) fn open(session_id: String, snapshot: Object) -> Self {
        Self {
            session_id,
            snapshot,
            changelog: Changelog::new(),
        }
    }
}

/// Result of [`crate::Client::synchronize_user`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    /// Entries sent.
    pub sent: usize,
    /// Entries the server reported as applied.
    pub processed: usize,
    /// Entries still pending afterwards.
    pub remaining: usize,
}

impl SyncOutcome {
    /// Returns true if nothing is left pending.
    pub fn is_complete(&self) -> bool {
        self.remaining == 0
    }
}

/// Result of [`crate::Client::log_out`].
///
/// Local state is cleared in both cases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogoutOutcome {
    /// The server invalidated the session.
    Acknowledged,
    /// The invalidation call failed; the session may still be valid
    /// server-side.
    Unacknowledged {
        /// Why the call failed.
        reason: String,
    },
}

impl LogoutOutcome {
    /// Returns true if the server confirmed the log-out.
    pub fn is_acknowledged(&self) -> bool {
        matches!(self, LogoutOutcome::Acknowledged)
    }
}
