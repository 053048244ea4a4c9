//! JSON to value decoding.

use crate::error::{CodecError, CodecResult};
use crate::value::{Object, Value};
use crate::{DATE_TAG, FLOAT_TAG, OBJECT_TAG};
use chrono::{DateTime, Utc};
use serde_json::Map;

/// Decodes date-aware JSON text into a value.
pub fn decode(text: &str) -> CodecResult<Value> {
    let json: serde_json::Value = serde_json::from_str(text)?;
    from_json(json)
}

/// Converts a tagged `serde_json` value back into a value.
pub fn from_json(json: serde_json::Value) -> CodecResult<Value> {
    match json {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Bool(b) => Ok(Value::Bool(b)),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(Value::Integer(i)),
            None => n
                .as_f64()
                .map(Value::Float)
                .ok_or_else(|| CodecError::invalid_structure(format!("unrepresentable number {n}"))),
        },
        serde_json::Value::String(s) => Ok(Value::Text(s)),
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(from_json)
            .collect::<CodecResult<Vec<_>>>()
            .map(Value::Array),
        serde_json::Value::Object(map) => decode_object(map),
    }
}

fn decode_object(mut map: Map<String, serde_json::Value>) -> CodecResult<Value> {
    if map.len() == 1 {
        if let Some(payload) = map.remove(DATE_TAG) {
            return decode_date(payload);
        }
        if let Some(payload) = map.remove(FLOAT_TAG) {
            return decode_float(payload);
        }
        if let Some(payload) = map.remove(OBJECT_TAG) {
            return match payload {
                serde_json::Value::Object(inner) => decode_plain(inner),
                other => Err(CodecError::invalid_tag(
                    OBJECT_TAG,
                    format!("expected object, got {other}"),
                )),
            };
        }
    }
    decode_plain(map)
}

fn decode_plain(map: Map<String, serde_json::Value>) -> CodecResult<Value> {
    map.into_iter()
        .map(|(k, v)| from_json(v).map(|v| (k, v)))
        .collect::<CodecResult<Object>>()
        .map(Value::Object)
}

fn decode_date(payload: serde_json::Value) -> CodecResult<Value> {
    let text = payload
        .as_str()
        .ok_or_else(|| CodecError::invalid_tag(DATE_TAG, "expected RFC 3339 string"))?;
    DateTime::parse_from_rfc3339(text)
        .map(|d| Value::Date(d.with_timezone(&Utc)))
        .map_err(|e| CodecError::invalid_tag(DATE_TAG, format!("{text:?}: {e}")))
}

fn decode_float(payload: serde_json::Value) -> CodecResult<Value> {
    match payload.as_str() {
        Some("NaN") => Ok(Value::Float(f64::NAN)),
        Some("Infinity") => Ok(Value::Float(f64::INFINITY)),
        Some("-Infinity") => Ok(Value::Float(f64::NEG_INFINITY)),
        _ => Err(CodecError::invalid_tag(
            FLOAT_TAG,
            format!("unknown non-finite float {payload}"),
        )),
    }
}
