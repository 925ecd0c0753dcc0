//! HTTP client with bounded retries, exponential backoff and per-source
//! rate limiting.
//!
//! Every network attempt (retries included) first acquires a slot from the
//! shared [`RateLimiter`]. Responses are classified into a [`FetchOutcome`]:
//! callers can tell "the upstream refused this request" apart from "we could
//! not get an answer", and decide for themselves whether to keep going.

#[cfg(test)]
pub(crate) mod mock;
mod response;
mod transport;

pub use response::RawResponse;
pub use transport::{ReqwestTransport, Transport, TransportError};

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error, warn};

use crate::rate_limit::{backoff_delay, parse_retry_after, RateLimiter};

/// Default user agent for upstream requests.
pub const USER_AGENT: &str = concat!("brewpipe/", env!("CARGO_PKG_VERSION"));

/// Why a request produced no payload after all attempts.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP {status} after {attempts} attempt(s)")]
    Status { status: u16, attempts: u32 },
    #[error("{error} after {attempts} attempt(s)")]
    Transport {
        error: TransportError,
        attempts: u32,
    },
    #[error("invalid JSON payload: {0}")]
    Decode(String),
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Result of one logical request.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// 2xx with a JSON body.
    Data(Value),
    /// Non-retryable client error (4xx other than 429). No data, no retry.
    Rejected { status: u16 },
    /// Retries exhausted, or the body could not be decoded.
    Failed(FetchError),
}

impl FetchOutcome {
    pub fn into_data(self) -> Option<Value> {
        match self {
            FetchOutcome::Data(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, FetchOutcome::Failed(_))
    }
}

/// Join a base URL and a path with exactly one slash between them.
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, path)
    }
}

/// Builder for constructing `HttpClient` with optional configuration.
pub struct HttpClientBuilder {
    timeout: Duration,
    user_agent: Option<String>,
    transport: Option<Arc<dyn Transport>>,
    rate_limiter: Option<RateLimiter>,
    retry_attempts: u32,
    backoff_base: f64,
}

impl HttpClientBuilder {
    /// Set the user agent string (ignored when a custom transport is given).
    pub fn user_agent(mut self, ua: &str) -> Self {
        self.user_agent = Some(ua.to_string());
        self
    }

    /// Use a custom transport instead of reqwest.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set a shared rate limiter.
    /// Without this, creates a per-client in-memory limiter with default spacing.
    pub fn rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Total attempts per request, including the first one.
    pub fn retry_attempts(mut self, attempts: u32) -> Self {
        self.retry_attempts = attempts.max(1);
        self
    }

    /// Base of the exponential backoff, in seconds.
    pub fn backoff_base(mut self, base: f64) -> Self {
        self.backoff_base = base;
        self
    }

    /// Build the `HttpClient`.
    pub fn build(self) -> Result<HttpClient, String> {
        let transport: Arc<dyn Transport> = match self.transport {
            Some(t) => t,
            None => {
                let ua = self.user_agent.as_deref().unwrap_or(USER_AGENT);
                Arc::new(ReqwestTransport::new(ua)?)
            }
        };

        let rate_limiter = self
            .rate_limiter
            .unwrap_or_else(|| RateLimiter::in_memory(Duration::from_millis(100)));

        Ok(HttpClient {
            transport,
            rate_limiter,
            timeout: self.timeout,
            retry_attempts: self.retry_attempts,
            backoff_base: self.backoff_base,
        })
    }
}

/// Retrying, rate-limited JSON client.
#[derive(Clone)]
pub struct HttpClient {
    transport: Arc<dyn Transport>,
    rate_limiter: RateLimiter,
    timeout: Duration,
    retry_attempts: u32,
    backoff_base: f64,
}

impl HttpClient {
    /// Create a builder. `timeout` applies to every individual attempt.
    pub fn builder(timeout: Duration) -> HttpClientBuilder {
        HttpClientBuilder {
            timeout,
            user_agent: None,
            transport: None,
            rate_limiter: None,
            retry_attempts: 3,
            backoff_base: 2.0,
        }
    }

    /// Get the rate limiter for this client.
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
    }

    /// GET `url` with query `params`, retrying transient failures.
    ///
    /// - 2xx: decoded JSON is returned as `Data`.
    /// - 429, 5xx, timeouts and connection errors: retried after
    ///   `backoff_base^attempt` seconds (429 also honours `Retry-After`).
    /// - Other 4xx: `Rejected` immediately.
    pub async fn request(&self, url: &str, params: &[(String, String)]) -> FetchOutcome {
        if RateLimiter::source_key(url).is_none() {
            return FetchOutcome::Failed(FetchError::InvalidUrl(url.to_string()));
        }

        let attempts = self.retry_attempts.max(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            let source = self.rate_limiter.acquire(url).await.unwrap_or_default();
            debug!("GET {} {:?} (attempt {})", url, params, attempt + 1);

            let mut wait = backoff_delay(self.backoff_base, attempt);

            match self.transport.get(url, params, self.timeout).await {
                Ok(response) => {
                    self.rate_limiter
                        .report_status(&source, response.status)
                        .await;

                    if response.is_success() {
                        return match response.json() {
                            Ok(value) => FetchOutcome::Data(value),
                            Err(e) => {
                                warn!("Malformed JSON from {}: {}", url, e);
                                FetchOutcome::Failed(FetchError::Decode(e.to_string()))
                            }
                        };
                    }

                    if !response.is_retryable() {
                        warn!("HTTP {} for {} - not retrying", response.status, url);
                        return FetchOutcome::Rejected {
                            status: response.status,
                        };
                    }

                    if response.status == 429 {
                        if let Some(retry_after) = parse_retry_after(response.header("retry-after"))
                        {
                            wait = wait.max(retry_after);
                        }
                    }
                    warn!(
                        "HTTP {} for {} (attempt {}/{})",
                        response.status,
                        url,
                        attempt + 1,
                        attempts
                    );
                    last_error = Some(FetchError::Status {
                        status: response.status,
                        attempts: attempt + 1,
                    });
                }
                Err(e) => {
                    warn!(
                        "Request error for {} (attempt {}/{}): {}",
                        url,
                        attempt + 1,
                        attempts,
                        e
                    );
                    last_error = Some(FetchError::Transport {
                        error: e,
                        attempts: attempt + 1,
                    });
                }
            }

            if attempt + 1 < attempts {
                debug!("Backing off {:?} before retrying {}", wait, url);
                tokio::time::sleep(wait).await;
            }
        }

        error!("Failed to fetch {} after {} attempts", url, attempts);
        FetchOutcome::Failed(last_error.unwrap_or(FetchError::Status {
            status: 0,
            attempts,
        }))
    }

    /// Single-attempt reachability check; true only for a 2xx answer.
    pub async fn probe(&self, url: &str, params: &[(String, String)]) -> bool {
        let Some(source) = self.rate_limiter.acquire(url).await else {
            return false;
        };
        match self.transport.get(url, params, self.timeout).await {
            Ok(response) => {
                self.rate_limiter
                    .report_status(&source, response.status)
                    .await;
                if !response.is_success() {
                    debug!("Probe of {} answered HTTP {}", url, response.status);
                }
                response.is_success()
            }
            Err(e) => {
                debug!("Probe of {} failed: {}", url, e);
                false
            }
        }
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("timeout", &self.timeout)
            .field("retry_attempts", &self.retry_attempts)
            .field("backoff_base", &self.backoff_base)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::mock::{test_client, MockTransport};
    use super::*;
    use serde_json::json;

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("https://api.example.com/v1/", "/breweries"),
            "https://api.example.com/v1/breweries"
        );
        assert_eq!(
            join_url("https://api.example.com/v1", ""),
            "https://api.example.com/v1"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_returns_data() {
        let transport = MockTransport::new(|_, _| Ok(RawResponse::json_ok(&json!([{"id": 1}]))));
        let client = test_client(transport.clone());

        let outcome = client.request("https://api.example.com/beers", &[]).await;

        assert_eq!(outcome.into_data(), Some(json!([{"id": 1}])));
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_error_is_retried_then_succeeds() {
        let transport = MockTransport::sequence(vec![
            Ok(RawResponse::new(503, Vec::new())),
            Ok(RawResponse::new(500, Vec::new())),
            Ok(RawResponse::json_ok(&json!([]))),
        ]);
        let client = test_client(transport.clone());

        let start = tokio::time::Instant::now();
        let outcome = client.request("https://api.example.com/beers", &[]).await;

        assert_eq!(outcome.into_data(), Some(json!([])));
        assert_eq!(transport.call_count(), 3);
        // 2^0 + 2^1 seconds of backoff
        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_fail() {
        let transport = MockTransport::new(|_, _| Err(TransportError::Timeout));
        let client = test_client(transport.clone());

        let outcome = client.request("https://api.example.com/beers", &[]).await;

        match outcome {
            FetchOutcome::Failed(FetchError::Transport { error, attempts }) => {
                assert!(matches!(error, TransportError::Timeout));
                assert_eq!(attempts, 3);
            }
            other => panic!("expected transport failure, got {:?}", other),
        }
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_client_error_is_not_retried() {
        let transport = MockTransport::new(|_, _| Ok(RawResponse::new(404, Vec::new())));
        let client = test_client(transport.clone());

        let outcome = client.request("https://api.example.com/beers/999", &[]).await;

        assert!(matches!(outcome, FetchOutcome::Rejected { status: 404 }));
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttling_honours_retry_after() {
        let transport = MockTransport::sequence(vec![
            Ok(RawResponse::new(429, Vec::new()).with_header("Retry-After", "7")),
            Ok(RawResponse::json_ok(&json!({"total": 3}))),
        ]);
        let client = test_client(transport.clone());

        let start = tokio::time::Instant::now();
        let outcome = client.request("https://api.example.com/meta", &[]).await;

        assert_eq!(outcome.into_data(), Some(json!({"total": 3})));
        assert!(start.elapsed() >= Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_body_fails_without_retry() {
        let transport = MockTransport::new(|_, _| Ok(RawResponse::new(200, b"<html>".to_vec())));
        let client = test_client(transport.clone());

        let outcome = client.request("https://api.example.com/beers", &[]).await;

        assert!(matches!(outcome, FetchOutcome::Failed(FetchError::Decode(_))));
        assert_eq!(transport.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_url_fails_without_network() {
        let transport = MockTransport::new(|_, _| Ok(RawResponse::json_ok(&json!([]))));
        let client = test_client(transport.clone());

        let outcome = client.request("not a url", &[]).await;

        assert!(matches!(outcome, FetchOutcome::Failed(FetchError::InvalidUrl(_))));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_attempt_acquires_rate_limit_slot() {
        let transport = MockTransport::new(|_, _| Ok(RawResponse::new(502, Vec::new())));
        let client = test_client(transport.clone());

        client.request("https://api.example.com/beers", &[]).await;

        let stats = client
            .rate_limiter()
            .stats("api.example.com")
            .await
            .unwrap();
        assert_eq!(stats.total_requests, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probe() {
        let transport = MockTransport::new(|url, _| {
            if url.ends_with("/up") {
                Ok(RawResponse::json_ok(&json!({})))
            } else {
                Ok(RawResponse::new(500, Vec::new()))
            }
        });
        let client = test_client(transport.clone());

        assert!(client.probe("https://api.example.com/up", &[]).await);
        assert!(!client.probe("https://api.example.com/down", &[]).await);
        assert_eq!(transport.call_count(), 2);
    }
}
