//! Change-log entries.

use crate::error::{ProtocolError, ProtocolResult};
use crate::messages::{required, required_text};
use tether_codec::{Object, Value};
use uuid::Uuid;

/// Kind of a pending field mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// Unconditional assignment. The only coalesced kind.
    Set,
    /// Removes the field.
    Unset,
    /// Adds a number to a numeric field.
    Increment,
    /// Pushes a value onto an array field.
    Append,
    /// Removes every array element equal to the value.
    Remove,
}

impl ChangeKind {
    /// All kinds, in wire order.
    pub const ALL: [ChangeKind; 5] = [
        ChangeKind::Set,
        ChangeKind::Unset,
        ChangeKind::Increment,
        ChangeKind::Append,
        ChangeKind::Remove,
    ];

    /// Returns the wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Set => "set",
            ChangeKind::Unset => "unset",
            ChangeKind::Increment => "increment",
            ChangeKind::Append => "append",
            ChangeKind::Remove => "remove",
        }
    }

    /// Parses a wire name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }

    /// Whether a newer entry of this kind supersedes older ones for the
    /// same field.
    pub fn is_coalesced(&self) -> bool {
        matches!(self, ChangeKind::Set)
    }
}

/// One pending, not yet server-confirmed mutation.
///
/// # Fields
///
/// - `id`: UUID v4 generated at append time; the server reports applied
///   entries by this id
/// - `field`: the profile field affected
/// - `kind`: what to do to the field
/// - `value`: the operand (`Null` for `Unset`)
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeLogEntry {
    /// Unique entry id.
    pub id: String,
    /// Target field.
    pub field: String,
    /// Mutation kind.
    pub kind: ChangeKind,
    /// Operand.
    pub value: Value,
}

impl ChangeLogEntry {
    /// Creates an entry with a freshly generated id.
    pub fn new(kind: ChangeKind, field: impl Into<String>, value: Value) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), kind, field, value)
    }

    /// Creates an entry with an explicit id.
    pub fn with_id(
        id: impl Into<String>,
        kind: ChangeKind,
        field: impl Into<String>,
        value: Value,
    ) -> Self {
        Self {
            id: id.into(),
            field: field.into(),
            kind,
            value,
        }
    }

    /// Converts to the wire record `{id, field, kind, value}`.
    pub fn to_value(&self) -> Value {
        Value::object([
            ("id", Value::from(self.id.as_str())),
            ("field", Value::from(self.field.as_str())),
            ("kind", Value::from(self.kind.as_str())),
            ("value", self.value.clone()),
        ])
    }

    /// Reads a wire record.
    pub fn from_value(value: &Value) -> ProtocolResult<Self> {
        let record = value
            .as_object()
            .ok_or_else(|| ProtocolError::invalid("change", "object", value.type_name()))?;

        let kind_name = required_text(record, "kind")?;
        let kind = ChangeKind::from_name(kind_name)
            .ok_or_else(|| ProtocolError::UnknownChangeKind(kind_name.to_string()))?;

        Ok(Self {
            id: required_text(record, "id")?.to_string(),
            field: required_text(record, "field")?.to_string(),
            kind,
            value: required(record, "value")?.clone(),
        })
    }

    /// Applies this change to a snapshot.
    ///
    /// The client uses this for optimistic local edits and a service uses
    /// it to replay the log, so both sides agree on the result.
    ///
    /// # Errors
    ///
    /// Returns `NotApplicable` if the field holds a type the change cannot
    /// operate on (e.g. incrementing text). The snapshot is left unchanged.
    pub fn apply(&self, snapshot: &mut Object) -> ProtocolResult<()> {
        let current = snapshot.get(&self.field).filter(|v| !v.is_null());
        let next = match self.kind {
            ChangeKind::Set => Some(self.value.clone()),
            ChangeKind::Unset => None,
            ChangeKind::Increment => Some(self.incremented(current)?),
            ChangeKind::Append => match current {
                None => Some(Value::Array(vec![self.value.clone()])),
                Some(Value::Array(items)) => {
                    let mut items = items.clone();
                    items.push(self.value.clone());
                    Some(Value::Array(items))
                }
                Some(other) => return Err(self.not_applicable(other)),
            },
            ChangeKind::Remove => match current {
                None => return Ok(()),
                Some(Value::Array(items)) => Some(Value::Array(
                    items.iter().filter(|v| **v != self.value).cloned().collect(),
                )),
                Some(other) => return Err(self.not_applicable(other)),
            },
        };

        match next {
            Some(value) => snapshot.insert(self.field.clone(), value),
            None => snapshot.remove(&self.field),
        };
        Ok(())
    }

    fn incremented(&self, current: Option<&Value>) -> ProtocolResult<Value> {
        match (current, &self.value) {
            (_, by) if by.as_number().is_none() => Err(ProtocolError::invalid(
                self.field.clone(),
                "number",
                by.type_name(),
            )),
            (None, by) => Ok(by.clone()),
            (Some(Value::Integer(a)), Value::Integer(b)) => Ok(a
                .checked_add(*b)
                .map_or(Value::Float(*a as f64 + *b as f64), Value::Integer)),
            (Some(current), by) => match (current.as_number(), by.as_number()) {
                (Some(a), Some(b)) => Ok(Value::Float(a + b)),
                _ => Err(self.not_applicable(current)),
            },
        }
    }

    fn not_applicable(&self, found: &Value) -> ProtocolError {
        ProtocolError::NotApplicable {
            kind: self.kind.as_str(),
            field: self.field.clone(),
            found: found.type_name(),
        }
    }
}
