//! HTTP transport implementation.
//!
//! The default [`RequestFunction`]: each request is an HTTP POST whose JSON
//! body carries one field, `payload`, holding the date-aware encoding of
//! the parameters. The response body is decoded the same way and must be
//! an envelope:
//!
//! ```text
//! {"status": "ok", "result": <value>}
//! {"status": "error", "code": 503, "message": "..."}
//! ```

use crate::error::{ClientError, ClientResult};
use crate::transport::RequestFunction;
use async_trait::async_trait;
use std::time::Duration;
use tether_codec::Value;

/// Envelope field carrying the status discriminator.
pub const STATUS: &str = "status";
/// Status value of a successful call.
pub const STATUS_OK: &str = "ok";
/// Envelope field carrying the result.
pub const RESULT: &str = "result";
/// Envelope field carrying a numeric error code.
pub const CODE: &str = "code";
/// Envelope field carrying an error message.
pub const MESSAGE: &str = "message";
/// Request body field carrying the encoded parameters.
pub const PAYLOAD: &str = "payload";

/// HTTP-based request function using `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `Transport` if the HTTP client cannot be built (e.g. no
    /// TLS backend is available).
    pub fn new(timeout: Duration) -> ClientResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    /// Wraps an existing `reqwest` client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RequestFunction for HttpTransport {
    async fn request(&self, url: &str, params: Value) -> ClientResult<Value> {
        let payload = tether_codec::encode(&params)?;
        let mut body = serde_json::Map::with_capacity(1);
        body.insert(PAYLOAD.to_string(), serde_json::Value::String(payload));

        let response = self
            .client
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ClientError::Transport(format!("POST {url} failed: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ClientError::Transport(format!("reading response failed: {e}")))?;

        // error envelopes may arrive with a non-2xx status
        match tether_codec::decode(&text) {
            Ok(envelope) => interpret_response(envelope),
            Err(_) if !status.is_success() => {
                Err(ClientError::Transport(format!("HTTP {status} from {url}")))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Unwraps a response envelope.
///
/// - `status == "ok"`: returns `result`, or `Null` if absent
/// - otherwise with numeric `code >= 500`: [`ClientError::Server`]
/// - otherwise: [`ClientError::Request`] with the server's message
///
/// # Errors
///
/// Returns `Protocol` if the envelope is not an object with a text status.
pub fn interpret_response(envelope: Value) -> ClientResult<Value> {
    let mut envelope = match envelope {
        Value::Object(envelope) => envelope,
        other => {
            return Err(
                tether_protocol::ProtocolError::invalid("response", "object", other.type_name())
                    .into(),
            )
        }
    };

    let status = tether_protocol::messages::required_text(&envelope, STATUS)?;
    if status == STATUS_OK {
        return Ok(envelope.remove(RESULT).unwrap_or(Value::Null));
    }

    let message = envelope
        .get(MESSAGE)
        .and_then(Value::as_text)
        .unwrap_or(status)
        .to_string();

    match envelope.get(CODE).and_then(Value::as_integer) {
        Some(code) if code >= 500 => Err(ClientError::Server { code, message }),
        _ => Err(ClientError::Request(message)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(pairs: Vec<(&str, Value)>) -> Value {
        Value::object(pairs)
    }

    #[test]
    fn ok_returns_result() {
        let result = interpret_response(envelope(vec![
            (STATUS, Value::from("ok")),
            (RESULT, Value::from(42)),
        ]));
        assert_eq!(result.unwrap(), Value::from(42));

        let bare = interpret_response(envelope(vec![(STATUS, Value::from("ok"))]));
        assert_eq!(bare.unwrap(), Value::Null);
    }

    #[test]
    fn server_class_codes() {
        let err = interpret_response(envelope(vec![
            (STATUS, Value::from("error")),
            (CODE, Value::from(503)),
            (MESSAGE, Value::from("maintenance")),
        ]))
        .unwrap_err();
        assert!(
            matches!(err, ClientError::Server { code: 503, ref message } if message == "maintenance")
        );
    }

    #[test]
    fn other_failures_are_requests() {
        let err = interpret_response(envelope(vec![
            (STATUS, Value::from("error")),
            (CODE, Value::from(401)),
            (MESSAGE, Value::from("bad credentials")),
        ]))
        .unwrap_err();
        assert!(matches!(err, ClientError::Request(ref m) if m == "bad credentials"));

        let err = interpret_response(envelope(vec![(STATUS, Value::from("denied"))])).unwrap_err();
        assert!(matches!(err, ClientError::Request(ref m) if m == "denied"));
    }

    #[test]
    fn malformed_envelopes() {
        assert!(matches!(
            interpret_response(Value::Null),
            Err(ClientError::Protocol(_))
        ));
        assert!(matches!(
            interpret_response(Value::empty_object()),
            Err(ClientError::Protocol(_))
        ));
    }

    #[test]
    fn build_transport() {
        assert!(HttpTransport::new(Duration::from_secs(5)).is_ok());
    }
}
