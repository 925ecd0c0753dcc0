//! Scripted transport for tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use super::{HttpClient, RawResponse, Transport, TransportError};
use crate::rate_limit::RateLimiter;

type Handler =
    Box<dyn Fn(&str, &[(String, String)]) -> Result<RawResponse, TransportError> + Send + Sync>;

/// Transport that answers from a closure (or a fixed sequence) and records
/// every call it receives.
pub(crate) struct MockTransport {
    handler: Handler,
    calls: Mutex<Vec<(String, Vec<(String, String)>)>>,
}

impl MockTransport {
    pub(crate) fn new<F>(handler: F) -> Arc<Self>
    where
        F: Fn(&str, &[(String, String)]) -> Result<RawResponse, TransportError>
            + Send
            + Sync
            + 'static,
    {
        Arc::new(Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        })
    }

    /// Answers with the given responses in order; repeats the last one.
    pub(crate) fn sequence(responses: Vec<Result<RawResponse, TransportError>>) -> Arc<Self> {
        let queue = Mutex::new(VecDeque::from(responses));
        Self::new(move |_, _| {
            let mut queue = queue.lock().unwrap();
            if queue.len() > 1 {
                queue.pop_front().unwrap()
            } else {
                queue.front().cloned().unwrap()
            }
        })
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub(crate) fn calls(&self) -> Vec<(String, Vec<(String, String)>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(
        &self,
        url: &str,
        query: &[(String, String)],
        _timeout: Duration,
    ) -> Result<RawResponse, TransportError> {
        self.calls
            .lock()
            .unwrap()
            .push((url.to_string(), query.to_vec()));
        (self.handler)(url, query)
    }
}

/// Look up a query parameter in a recorded call.
pub(crate) fn param<'a>(query: &'a [(String, String)], name: &str) -> Option<&'a str> {
    query
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

/// Client over `transport` with no request spacing and three attempts.
pub(crate) fn test_client(transport: Arc<MockTransport>) -> HttpClient {
    HttpClient::builder(Duration::from_secs(30))
        .transport(transport)
        .rate_limiter(RateLimiter::in_memory(Duration::ZERO))
        .retry_attempts(3)
        .backoff_base(2.0)
        .build()
        .unwrap()
}
