//! Value to JSON encoding.

use crate::error::CodecResult;
use crate::value::{Object, Value};
use crate::{DATE_TAG, FLOAT_TAG, OBJECT_TAG};
use chrono::SecondsFormat;
use serde_json::{Map, Number};

/// Encodes a value to date-aware JSON text.
pub fn encode(value: &Value) -> CodecResult<String> {
    Ok(serde_json::to_string(&to_json(value))?)
}

/// Converts a value to its tagged `serde_json` representation.
pub fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Integer(n) => serde_json::Value::Number(Number::from(*n)),
        Value::Float(f) => match Number::from_f64(*f) {
            Some(n) => serde_json::Value::Number(n),
            None => tagged(FLOAT_TAG, serde_json::Value::String(non_finite_name(*f).into())),
        },
        Value::Text(s) => serde_json::Value::String(s.clone()),
        Value::Date(d) => tagged(
            DATE_TAG,
            serde_json::Value::String(d.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        ),
        Value::Array(items) => serde_json::Value::Array(items.iter().map(to_json).collect()),
        Value::Object(object) => {
            let plain = plain_object(object);
            if looks_tagged(object) {
                tagged(OBJECT_TAG, plain)
            } else {
                plain
            }
        }
    }
}

fn plain_object(object: &Object) -> serde_json::Value {
    serde_json::Value::Object(
        object
            .iter()
            .map(|(k, v)| (k.clone(), to_json(v)))
            .collect::<Map<_, _>>(),
    )
}

/// A single-key object whose key is a tag must be escaped.
fn looks_tagged(object: &Object) -> bool {
    object.len() == 1
        && object
            .keys()
            .next()
            .is_some_and(|k| k == DATE_TAG || k == FLOAT_TAG || k == OBJECT_TAG)
}

fn tagged(tag: &str, payload: serde_json::Value) -> serde_json::Value {
    let mut map = Map::with_capacity(1);
    map.insert(tag.to_string(), payload);
    serde_json::Value::Object(map)
}

fn non_finite_name(f: f64) -> &'static str {
    if f.is_nan() {
        "NaN"
    } else if f.is_sign_positive() {
        "Infinity"
    } else {
        "-Infinity"
    }
}
