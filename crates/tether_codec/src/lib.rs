//! # Tether Codec
//!
//! Dynamic values and date-aware structural serialization for Tether.
//!
//! Profile fields, change-log payloads and request/response bodies are all
//! [`Value`]s. They are serialized as JSON text with a small tagging scheme
//! so that values JSON cannot express natively survive a round trip exactly:
//!
//! - Timestamps: `{"$date": "2024-05-01T12:00:00.123456789Z"}`
//! - Non-finite floats: `{"$float": "NaN" | "Infinity" | "-Infinity"}`
//! - Plain objects whose only key is one of the tags above are wrapped
//!   as `{"$object": {...}}`
//!
//! ## Usage
//!
//! ```
//! use tether_codec::{decode, encode, Value};
//!
//! let value = Value::object([("name", Value::from("Ada")), ("age", Value::from(36))]);
//! let text = encode(&value).unwrap();
//! assert_eq!(decode(&text).unwrap(), value);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod decoder;
mod encoder;
mod error;
mod value;

pub use decoder::{decode, from_json};
pub use encoder::{encode, to_json};
pub use error::{CodecError, CodecResult};
pub use value::{Object, Value};

/// Tag key marking an encoded timestamp.
pub const DATE_TAG: &str = "$date";
/// Tag key marking an encoded non-finite float.
pub const FLOAT_TAG: &str = "$float";
/// Tag key wrapping a plain object that would otherwise look like a tag.
pub const OBJECT_TAG: &str = "$object";

impl serde::Serialize for Value {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        to_json(self).serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for Value {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let json = serde_json::Value::deserialize(deserializer)?;
        from_json(json).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn roundtrip_nested_with_dates() {
        let created = Utc.with_ymd_and_hms(2023, 11, 14, 22, 13, 20).unwrap();
        let value = Value::object([
            ("name", Value::from("Ada")),
            ("created", Value::Date(created)),
            (
                "history",
                Value::Array(vec![Value::Date(created), Value::Float(1.5), Value::Null]),
            ),
        ]);

        let text = encode(&value).unwrap();
        assert_eq!(decode(&text).unwrap(), value);
    }

    #[test]
    fn serde_uses_tagged_representation() {
        let created = Utc.with_ymd_and_hms(2020, 1, 2, 3, 4, 5).unwrap();
        let value = Value::object([("at", Value::Date(created))]);

        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json["at"][DATE_TAG], "2020-01-02T03:04:05Z");

        let back: Value = serde_json::from_value(json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn serde_rejects_bad_tag() {
        let result: Result<Value, _> = serde_json::from_str(r#"{"$date": "yesterday"}"#);
        assert!(result.is_err());
    }
}
