//! Typed access over an opaque string store.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use std::fmt;
use std::sync::Arc;
use tether_codec::Value;

/// A scalar value stored through the bridge.
#[derive(Debug, Clone, PartialEq)]
pub enum Primitive {
    /// A boolean flag.
    Bool(bool),
    /// A number. Integers and floats share one representation, so
    /// integers beyond ±2^53 lose precision when read back. Values that
    /// must stay exact belong in an object read with `get_object`.
    Number(f64),
    /// A text value.
    Text(String),
}

impl Primitive {
    fn into_value(self) -> Value {
        match self {
            Primitive::Bool(b) => Value::Bool(b),
            Primitive::Number(n) => Value::Float(n),
            Primitive::Text(s) => Value::Text(s),
        }
    }

    /// Returns a short name for the variant, used in error messages.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Primitive::Bool(_) => "bool",
            Primitive::Number(_) => "number",
            Primitive::Text(_) => "text",
        }
    }

    /// Returns the text if this is a text primitive.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Primitive::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for Primitive {
    fn from(b: bool) -> Self {
        Primitive::Bool(b)
    }
}

impl From<f64> for Primitive {
    fn from(n: f64) -> Self {
        Primitive::Number(n)
    }
}

impl From<String> for Primitive {
    fn from(s: String) -> Self {
        Primitive::Text(s)
    }
}

impl From<&str> for Primitive {
    fn from(s: &str) -> Self {
        Primitive::Text(s.to_string())
    }
}

/// Typed storage on top of a [`StorageBackend`].
///
/// Every value is written as encoded JSON text, so primitives land as JSON
/// scalars (`true`, `1.5`, `"abc"`) and structured values keep their dates
/// through the codec's tagged form.
#[derive(Clone)]
pub struct StorageBridge {
    backend: Arc<dyn StorageBackend>,
}

impl fmt::Debug for StorageBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageBridge").finish_non_exhaustive()
    }
}

impl StorageBridge {
    /// Creates a bridge over the given backend.
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self { backend }
    }

    /// Returns the underlying backend.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Reads a primitive stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns `TypeMismatch` if the stored value is not a scalar, or a
    /// codec error if it is not valid JSON.
    pub async fn get_primitive(&self, key: &str) -> StorageResult<Option<Primitive>> {
        let Some(value) = self.get_object(key).await? else {
            return Ok(None);
        };
        let primitive = match value {
            Value::Bool(b) => Primitive::Bool(b),
            Value::Integer(i) => Primitive::Number(i as f64),
            Value::Float(f) => Primitive::Number(f),
            Value::Text(s) => Primitive::Text(s),
            other => {
                return Err(StorageError::TypeMismatch {
                    key: key.to_string(),
                    expected: "primitive",
                    found: other.type_name(),
                })
            }
        };
        Ok(Some(primitive))
    }

    /// Stores a primitive under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    pub async fn set_primitive(&self, key: &str, value: &Primitive) -> StorageResult<()> {
        self.set_object(key, &value.clone().into_value()).await
    }

    /// Reads a structured value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the stored text does not decode.
    pub async fn get_object(&self, key: &str) -> StorageResult<Option<Value>> {
        match self.backend.get_item(key).await? {
            Some(text) => tether_codec::decode(&text)
                .map(Some)
                .map_err(|e| StorageError::codec(key, e)),
            None => Ok(None),
        }
    }

    /// Stores a structured value under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the backend write fails.
    pub async fn set_object(&self, key: &str, value: &Value) -> StorageResult<()> {
        let text = tether_codec::encode(value).map_err(|e| StorageError::codec(key, e))?;
        self.backend.set_item(key, &text).await
    }

    /// Removes `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    pub async fn remove(&self, key: &str) -> StorageResult<()> {
        self.backend.remove_item(key).await
    }
}
