//! The user mutation handle.

use crate::error::{ClientError, ClientResult};
use crate::session::Session;
use tether_codec::Value;
use tether_protocol::{ChangeKind, ChangeLogEntry};

/// A view of the logged-in user.
///
/// Obtained from [`crate::Client::current_user`]. The handle mutably
/// borrows the client, so no other operation can run while it is alive,
/// and it cannot outlive the session it was created for.
///
/// Reads reflect local optimistic state, pending edits included, and never
/// touch the network. Every mutation updates the snapshot and records a
/// change; there is no way to reach the snapshot or the changelog
/// directly.
pub struct UserHandle<'a> {
    session: &'a mut Session,
}

impl<'a> UserHandle<'a> {
    pub(crate) fn new(session: &'a mut Session) -> Self {
        Self { session }
    }

    /// Returns the current value of `field`.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.session.snapshot.get(field)
    }

    /// Iterates over all fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.session
            .snapshot
            .iter()
            .map(|(name, value)| (name.as_str(), value))
    }

    /// Returns the session id.
    pub fn session_id(&self) -> &str {
        &self.session.session_id
    }

    /// Returns the number of changes not yet confirmed by the server.
    pub fn pending_changes(&self) -> usize {
        self.session.changelog.len()
    }

    /// Assigns `field`. Supersedes any pending assignment to it.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) {
        // set never fails to apply
        let _ = self.apply(ChangeKind::Set, field, value.into());
    }

    /// Removes `field`.
    pub fn unset(&mut self, field: &str) {
        let _ = self.apply(ChangeKind::Unset, field, Value::Null);
    }

    /// Adds `by` to a numeric field. A missing field starts at `by`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidChange` if the field or `by` is not numeric.
    pub fn increment(&mut self, field: &str, by: impl Into<Value>) -> ClientResult<()> {
        self.apply(ChangeKind::Increment, field, by.into())
    }

    /// Pushes `value` onto an array field. A missing field becomes `[value]`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidChange` if the field holds something other than an array.
    pub fn append(&mut self, field: &str, value: impl Into<Value>) -> ClientResult<()> {
        self.apply(ChangeKind::Append, field, value.into())
    }

    /// Removes every element equal to `value` from an array field.
    ///
    /// # Errors
    ///
    /// Returns `InvalidChange` if the field holds something other than an array.
    pub fn remove(&mut self, field: &str, value: impl Into<Value>) -> ClientResult<()> {
        self.apply(ChangeKind::Remove, field, value.into())
    }

    /// Records a change without touching the snapshot.
    ///
    /// For server-side semantics the client cannot replay locally. The
    /// snapshot catches up on the next synchronization. Returns the id of
    /// the new entry.
    pub fn append_change(&mut self, kind: ChangeKind, field: &str, value: impl Into<Value>) -> String {
        self.session.changelog.record(kind, field, value.into())
    }

    fn apply(&mut self, kind: ChangeKind, field: &str, value: Value) -> ClientResult<()> {
        let entry = ChangeLogEntry::new(kind, field, value);
        entry
            .apply(&mut self.session.snapshot)
            .map_err(ClientError::InvalidChange)?;
        tracing::trace!(field, kind = kind.as_str(), id = %entry.id, "recorded change");
        self.session.changelog.push(entry);
        Ok(())
    }
}

impl std::fmt::Debug for UserHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserHandle")
            .field("session_id", &self.session.session_id)
            .field("fields", &self.session.snapshot.len())
            .field("pending_changes", &self.session.changelog.len())
            .finish()
    }
}
