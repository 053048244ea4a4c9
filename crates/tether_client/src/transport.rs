//! Transport abstraction for request dispatch.

use crate::error::{ClientError, ClientResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tether_codec::Value;

/// The pluggable request function.
///
/// Every call the client makes (log-in variants, synchronization, queries,
/// custom functions) goes through a single `request`. The URL is the
/// configured server URL with the endpoint name appended; `params` is the
/// parameter object including `installationId`.
///
/// Implementations return the `result` of a successful call, or map a
/// failed call onto [`ClientError::Server`], [`ClientError::Request`] or
/// [`ClientError::Transport`]. Timeouts are the implementation's concern.
#[async_trait]
pub trait RequestFunction: Send + Sync {
    /// Performs one request.
    async fn request(&self, url: &str, params: Value) -> ClientResult<Value>;
}

#[async_trait]
impl<T: RequestFunction + ?Sized> RequestFunction for Arc<T> {
    async fn request(&self, url: &str, params: Value) -> ClientResult<Value> {
        (**self).request(url, params).await
    }
}

/// Returns the endpoint part of a request URL.
pub fn endpoint_of(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}

/// A request observed by [`MockTransport`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    /// Full request URL.
    pub url: String,
    /// Endpoint name (last path segment).
    pub endpoint: String,
    /// Parameters as sent.
    pub params: Value,
}

/// A scripted transport for testing.
///
/// Responses are queued per endpoint and consumed in order. A call to an
/// endpoint with nothing queued fails with a transport error. Every call
/// is recorded, including failed ones.
#[derive(Debug, Default)]
pub struct MockTransport {
    responses: Mutex<HashMap<String, VecDeque<ClientResult<Value>>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockTransport {
    /// Creates a mock with nothing queued.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a successful result for `endpoint`.
    pub fn push_response(&self, endpoint: &str, result: Value) {
        self.push(endpoint, Ok(result));
    }

    /// Queues a failure for `endpoint`.
    pub fn push_error(&self, endpoint: &str, error: ClientError) {
        self.push(endpoint, Err(error));
    }

    fn push(&self, endpoint: &str, reply: ClientResult<Value>) {
        self.responses
            .lock()
            .entry(endpoint.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Returns every recorded call in order.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Returns the parameters of every call to `endpoint`.
    pub fn calls_to(&self, endpoint: &str) -> Vec<Value> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.endpoint == endpoint)
            .map(|c| c.params.clone())
            .collect()
    }

    /// Returns the number of recorded calls.
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl RequestFunction for MockTransport {
    async fn request(&self, url: &str, params: Value) -> ClientResult<Value> {
        let endpoint = endpoint_of(url).to_string();
        self.calls.lock().push(RecordedCall {
            url: url.to_string(),
            endpoint: endpoint.clone(),
            params,
        });

        self.responses
            .lock()
            .get_mut(&endpoint)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                Err(ClientError::Transport(format!(
                    "no mock response queued for {endpoint}"
                )))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_is_last_segment() {
        assert_eq!(endpoint_of("https://x.test/api/logIn"), "logIn");
        assert_eq!(endpoint_of("logIn"), "logIn");
    }

    #[tokio::test]
    async fn mock_replies_in_order() {
        let mock = MockTransport::new();
        mock.push_response("logIn", Value::from(1));
        mock.push_error("logIn", ClientError::Request("nope".into()));

        let first = mock.request("https://x.test/logIn", Value::Null).await;
        assert_eq!(first.unwrap(), Value::from(1));

        let second = mock.request("https://x.test/logIn", Value::Null).await;
        assert!(matches!(second, Err(ClientError::Request(_))));

        let third = mock.request("https://x.test/logIn", Value::Null).await;
        assert!(matches!(third, Err(ClientError::Transport(_))));

        assert_eq!(mock.call_count(), 3);
        assert_eq!(mock.calls_to("logIn").len(), 3);
        assert!(mock.calls_to("signUp").is_empty());
    }

    #[tokio::test]
    async fn mock_records_params() {
        let mock = MockTransport::new();
        mock.push_response("run", Value::Null);

        let params = Value::object([("a", Value::from(1))]);
        mock.request("https://x.test/run", params.clone()).await.unwrap();

        let calls = mock.calls();
        assert_eq!(calls[0].url, "https://x.test/run");
        assert_eq!(calls[0].params, params);
    }
}
