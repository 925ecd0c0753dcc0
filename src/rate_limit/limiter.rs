//! Adaptive per-source rate limiter.
//!
//! Provides the high-level rate limiting API that wraps a pluggable backend.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use url::Url;

pub use super::config::{RateLimitConfig, SourceStats};

use super::backend::{RateLimitBackend, SourceRateState};
use super::memory::InMemoryRateLimitBackend;

/// Type alias for a boxed rate limit backend.
pub type BoxedRateLimitBackend = Arc<dyn RateLimitBackend>;

/// Adaptive rate limiter that tracks per-source request timing.
///
/// Wraps a `RateLimitBackend` and provides high-level rate limiting logic:
/// - A minimum interval between requests to the same source
/// - Exponential widening of the interval on throttling responses (429, 503)
/// - Gradual recovery after consecutive successes
///
/// Clones share state, so one limiter can be handed to every component that
/// talks to the same upstream.
#[derive(Clone)]
pub struct RateLimiter {
    backend: BoxedRateLimitBackend,
    config: RateLimitConfig,
}

impl RateLimiter {
    /// Create a new rate limiter with the given backend.
    pub fn new(backend: BoxedRateLimitBackend) -> Self {
        Self::with_config(backend, RateLimitConfig::default())
    }

    /// Create a new rate limiter with custom config.
    pub fn with_config(backend: BoxedRateLimitBackend, config: RateLimitConfig) -> Self {
        Self { backend, config }
    }

    /// In-memory limiter with the given base spacing.
    pub fn in_memory(min_interval: Duration) -> Self {
        Self::with_config(
            Arc::new(InMemoryRateLimitBackend::new()),
            RateLimitConfig::with_min_interval(min_interval),
        )
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Extract the source key (host) from a URL.
    pub fn source_key(url: &str) -> Option<String> {
        Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(|s| s.to_string()))
    }

    fn base_interval_ms(&self) -> u64 {
        u64::try_from(self.config.min_interval.as_millis()).unwrap_or(u64::MAX)
    }

    fn max_interval_ms(&self) -> u64 {
        u64::try_from(self.config.max_interval.as_millis()).unwrap_or(u64::MAX)
    }

    /// Wait until the source is ready, then mark the request as started.
    /// Returns the source key, or None if the URL has no host.
    pub async fn acquire(&self, url: &str) -> Option<String> {
        let source = Self::source_key(url)?;

        match self.backend.reserve(&source, self.base_interval_ms()).await {
            Ok(wait_time) => {
                if wait_time > Duration::ZERO {
                    debug!("Rate limiting {}: waiting {:?}", source, wait_time);
                    tokio::time::sleep(wait_time).await;
                }
            }
            Err(e) => {
                // Fall back to allowing the request
                warn!("Rate limit acquire failed for {}: {}", source, e);
            }
        }
        Some(source)
    }

    async fn load_state(&self, source: &str) -> Option<SourceRateState> {
        match self
            .backend
            .get_or_create(source, self.base_interval_ms())
            .await
        {
            Ok(s) => Some(s),
            Err(e) => {
                warn!("Failed to get rate state for {}: {}", source, e);
                None
            }
        }
    }

    async fn modify_state(
        &self,
        source: &str,
        change: &mut (dyn FnMut(&mut SourceRateState) + Send),
    ) -> Option<SourceRateState> {
        match self
            .backend
            .modify(source, self.base_interval_ms(), change)
            .await
        {
            Ok(s) => Some(s),
            Err(e) => {
                warn!("Failed to update rate state for {}: {}", source, e);
                None
            }
        }
    }

    /// Report a successful request - may shrink the interval.
    pub async fn report_success(&self, source: &str) {
        let base = self.base_interval_ms();
        let config = &self.config;
        let mut recovered = false;
        let Some(state) = self
            .modify_state(source, &mut |state: &mut SourceRateState| {
                state.consecutive_successes += 1;
                if state.in_backoff && state.consecutive_successes >= config.recovery_threshold {
                    let reduced = (state.current_interval_ms as f64 * config.recovery_multiplier) as u64;
                    state.current_interval_ms = reduced.max(base);
                    if state.current_interval_ms <= base {
                        state.in_backoff = false;
                        state.current_interval_ms = base;
                        recovered = true;
                    }
                    state.consecutive_successes = 0;
                }
            })
            .await
        else {
            return;
        };

        if recovered {
            info!("Source {} recovered from rate limit backoff", source);
        } else if state.in_backoff && state.consecutive_successes == 0 {
            debug!(
                "Source {} interval reduced to {}ms",
                source, state.current_interval_ms
            );
        }
    }

    /// Check if a status code is definitely a rate limit.
    pub fn is_definite_rate_limit(status_code: u16) -> bool {
        matches!(status_code, 429 | 503)
    }

    /// Report a definite rate limit hit (429 or 503) - widens the interval.
    pub async fn report_rate_limit(&self, source: &str, status_code: u16) {
        let max = self.max_interval_ms();
        let multiplier = self.config.backoff_multiplier;
        let Some(state) = self
            .modify_state(source, &mut |state: &mut SourceRateState| {
                state.rate_limit_hits += 1;
                state.consecutive_successes = 0;
                state.in_backoff = true;
                let widened = (state.current_interval_ms.max(1) as f64 * multiplier) as u64;
                state.current_interval_ms = widened.min(max);
            })
            .await
        else {
            return;
        };

        warn!(
            "Rate limited by {} (HTTP {}), spacing requests {}ms apart",
            source, status_code, state.current_interval_ms
        );
    }

    /// Report a server error (5xx other than 503) - mild backoff.
    pub async fn report_server_error(&self, source: &str) {
        let max = self.max_interval_ms();
        let Some(state) = self
            .modify_state(source, &mut |state: &mut SourceRateState| {
                state.consecutive_successes = 0;
                let widened = (state.current_interval_ms.max(1) as f64 * 1.5) as u64;
                state.current_interval_ms = widened.min(max);
            })
            .await
        else {
            return;
        };

        debug!(
            "Server error for {}, interval increased to {}ms",
            source, state.current_interval_ms
        );
    }

    /// Classify a response status code and report it to the appropriate handler.
    ///
    /// Client errors other than 429 leave the interval unchanged.
    pub async fn report_status(&self, source: &str, status_code: u16) {
        if Self::is_definite_rate_limit(status_code) {
            self.report_rate_limit(source, status_code).await;
        } else if status_code >= 500 {
            self.report_server_error(source).await;
        } else if (200..400).contains(&status_code) {
            self.report_success(source).await;
        }
    }

    /// Get statistics for a source, if it has been seen.
    pub async fn stats(&self, source: &str) -> Option<SourceStats> {
        self.load_state(source).await.map(|s| SourceStats {
            current_interval_ms: s.current_interval_ms,
            in_backoff: s.in_backoff,
            total_requests: s.total_requests,
            rate_limit_hits: s.rate_limit_hits,
        })
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_limiter() -> RateLimiter {
        RateLimiter::with_config(
            Arc::new(InMemoryRateLimitBackend::new()),
            RateLimitConfig {
                min_interval: Duration::from_millis(100),
                backoff_multiplier: 2.0,
                recovery_threshold: 2,
                ..Default::default()
            },
        )
    }

    #[test]
    fn test_source_key() {
        assert_eq!(
            RateLimiter::source_key("https://api.openbrewerydb.org/v1/breweries?page=2"),
            Some("api.openbrewerydb.org".to_string())
        );
        assert_eq!(RateLimiter::source_key("not a url"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_enforces_min_interval() {
        let limiter = create_test_limiter();

        let start = tokio::time::Instant::now();
        limiter.acquire("https://api.example.com/a").await;
        limiter.acquire("https://api.example.com/b").await;
        limiter.acquire("https://api.example.com/c").await;

        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_acquires_are_serialized() {
        let limiter = create_test_limiter();
        let start = tokio::time::Instant::now();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move {
                    limiter.acquire("https://api.example.com/x").await;
                    tokio::time::Instant::now()
                })
            })
            .collect();

        let mut finished = Vec::new();
        for handle in handles {
            finished.push(handle.await.unwrap());
        }
        finished.sort();

        for pair in finished.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_millis(100));
        }
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_rate_limit_widens_interval() {
        let limiter = create_test_limiter();
        limiter.acquire("https://api.example.com/doc").await;

        limiter.report_status("api.example.com", 429).await;

        let stats = limiter.stats("api.example.com").await.unwrap();
        assert!(stats.in_backoff);
        assert_eq!(stats.rate_limit_hits, 1);
        assert_eq!(stats.current_interval_ms, 200);
    }

    #[tokio::test]
    async fn test_recovery_after_successes() {
        let limiter = create_test_limiter();
        limiter.acquire("https://api.example.com/doc").await;
        limiter.report_rate_limit("api.example.com", 503).await;

        // 200 -> 160 -> 128 -> 102 -> 100, two successes per step
        for _ in 0..8 {
            limiter.report_success("api.example.com").await;
        }

        let stats = limiter.stats("api.example.com").await.unwrap();
        assert!(!stats.in_backoff);
        assert_eq!(stats.current_interval_ms, 100);
    }

    #[tokio::test]
    async fn test_concurrent_reports_are_all_counted() {
        let limiter = RateLimiter::with_config(
            Arc::new(InMemoryRateLimitBackend::new()),
            RateLimitConfig {
                min_interval: Duration::from_millis(1),
                max_interval: Duration::from_secs(3600),
                ..Default::default()
            },
        );
        limiter.acquire("https://api.example.com/doc").await;

        let handles: Vec<_> = (0..20)
            .map(|_| {
                let limiter = limiter.clone();
                tokio::spawn(async move {
                    limiter.report_rate_limit("api.example.com", 429).await;
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        let stats = limiter.stats("api.example.com").await.unwrap();
        assert_eq!(stats.rate_limit_hits, 20);
    }

    #[tokio::test]
    async fn test_client_error_leaves_interval_unchanged() {
        let limiter = create_test_limiter();
        limiter.acquire("https://api.example.com/doc").await;

        limiter.report_status("api.example.com", 404).await;

        let stats = limiter.stats("api.example.com").await.unwrap();
        assert!(!stats.in_backoff);
        assert_eq!(stats.current_interval_ms, 100);
    }
}
