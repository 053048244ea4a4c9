//! The pending change queue.

use crate::change::{ChangeKind, ChangeLogEntry};
use crate::error::{ProtocolError, ProtocolResult};
use std::collections::HashSet;
use tether_codec::Value;

/// An ordered queue of pending changes.
///
/// Entries are replayed by the server in order, so order is preserved
/// by every operation here.
///
/// # Invariants
///
/// - Appending a `Set` entry for a field removes every earlier `Set`
///   entry for that field
/// - Entries of other kinds are never removed by coalescing and keep
///   their relative order
/// - `prune` removes exactly the named ids
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changelog {
    entries: Vec<ChangeLogEntry>,
}

impl Changelog {
    /// Creates an empty changelog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restores a changelog from previously persisted entries, as-is.
    pub fn from_entries(entries: Vec<ChangeLogEntry>) -> Self {
        Self { entries }
    }

    /// Appends an entry, coalescing earlier `Set`s for the same field.
    pub fn push(&mut self, entry: ChangeLogEntry) {
        if entry.kind.is_coalesced() {
            self.entries
                .retain(|e| !(e.kind == entry.kind && e.field == entry.field));
        }
        self.entries.push(entry);
    }

    /// Creates and appends a new entry, returning its id.
    pub fn record(&mut self, kind: ChangeKind, field: impl Into<String>, value: Value) -> String {
        let entry = ChangeLogEntry::new(kind, field, value);
        let id = entry.id.clone();
        self.push(entry);
        id
    }

    /// Removes the entries whose ids are in `processed`.
    ///
    /// Returns the number of entries removed. Unknown ids are ignored.
    pub fn prune<'a, I>(&mut self, processed: I) -> usize
    where
        I: IntoIterator<Item = &'a str>,
    {
        let processed: HashSet<&str> = processed.into_iter().collect();
        let before = self.entries.len();
        self.entries.retain(|e| !processed.contains(e.id.as_str()));
        before - self.entries.len()
    }

    /// Returns the pending entries in order.
    pub fn entries(&self) -> &[ChangeLogEntry] {
        &self.entries
    }

    /// Returns an iterator over pending entries.
    pub fn iter(&self) -> impl Iterator<Item = &ChangeLogEntry> {
        self.entries.iter()
    }

    /// Returns the number of pending entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Converts to the wire array of entry records.
    pub fn to_value(&self) -> Value {
        Value::Array(self.entries.iter().map(ChangeLogEntry::to_value).collect())
    }

    /// Reads a wire array of entry records.
    pub fn from_value(value: &Value) -> ProtocolResult<Self> {
        let items = value
            .as_array()
            .ok_or_else(|| ProtocolError::invalid("changelog", "array", value.type_name()))?;
        items
            .iter()
            .map(ChangeLogEntry::from_value)
            .collect::<ProtocolResult<Vec<_>>>()
            .map(Self::from_entries)
    }
}

impl<'a> IntoIterator for &'a Changelog {
    type Item = &'a ChangeLogEntry;
    type IntoIter = std::slice::Iter<'a, ChangeLogEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, kind: ChangeKind, field: &str, value: i64) -> ChangeLogEntry {
        ChangeLogEntry::with_id(id, kind, field, Value::Integer(value))
    }

    #[test]
    fn set_coalesces_per_field() {
        let mut log = Changelog::new();
        log.push(entry("a", ChangeKind::Set, "f", 1));
        log.push(entry("b", ChangeKind::Set, "g", 1));
        log.push(entry("c", ChangeKind::Set, "f", 2));

        let ids: Vec<&str> = log.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["b", "c"]);
        assert_eq!(log.entries()[1].value, Value::Integer(2));
    }

    #[test]
    fn other_kinds_keep_order() {
        let mut log = Changelog::new();
        log.push(entry("a", ChangeKind::Increment, "f", 1));
        log.push(entry("b", ChangeKind::Increment, "f", 2));
        log.push(entry("c", ChangeKind::Set, "f", 9));

        let ids: Vec<&str> = log.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["a", "b", "c"]);
    }

    #[test]
    fn set_does_not_remove_other_kinds() {
        let mut log = Changelog::new();
        log.push(entry("a", ChangeKind::Set, "f", 1));
        log.push(entry("b", ChangeKind::Append, "f", 2));
        log.push(entry("c", ChangeKind::Set, "f", 3));

        let ids: Vec<&str> = log.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["b", "c"]);
    }

    #[test]
    fn prune_processed() {
        let mut log = Changelog::from_entries(vec![
            entry("a", ChangeKind::Set, "x", 1),
            entry("b", ChangeKind::Set, "y", 2),
            entry("c", ChangeKind::Set, "z", 3),
        ]);

        assert_eq!(log.prune(["a", "c", "unknown"]), 2);
        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].id, "b");
    }

    #[test]
    fn record_returns_id() {
        let mut log = Changelog::new();
        let id = log.record(ChangeKind::Unset, "f", Value::Null);
        assert_eq!(log.entries()[0].id, id);
    }

    #[test]
    fn wire_roundtrip() {
        let log = Changelog::from_entries(vec![
            entry("a", ChangeKind::Increment, "n", 1),
            entry("b", ChangeKind::Set, "m", 2),
        ]);
        assert_eq!(Changelog::from_value(&log.to_value()).unwrap(), log);
        assert!(Changelog::from_value(&Value::Null).is_err());
    }
}
