//! Pluggable backend trait for rate limiting storage.

use async_trait::async_trait;
use std::time::Duration;

/// Result type for rate limit operations.
pub type RateLimitResult<T> = Result<T, RateLimitError>;

/// Errors from rate limit backend operations.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// Snapshot of one source's rate limiting state.
#[derive(Debug, Clone)]
pub struct SourceRateState {
    pub source: String,
    pub current_interval_ms: u64,
    pub consecutive_successes: u32,
    pub in_backoff: bool,
    pub total_requests: u64,
    pub rate_limit_hits: u64,
}

impl SourceRateState {
    pub fn new(source: String, base_interval_ms: u64) -> Self {
        Self {
            source,
            current_interval_ms: base_interval_ms,
            consecutive_successes: 0,
            in_backoff: false,
            total_requests: 0,
            rate_limit_hits: 0,
        }
    }

    pub fn current_interval(&self) -> Duration {
        Duration::from_millis(self.current_interval_ms)
    }
}

/// Trait for rate limit storage backends.
///
/// Implementations must serialize access to the "last request" timestamp:
/// two concurrent `acquire` calls must never both observe the same gap.
#[async_trait]
pub trait RateLimitBackend: Send + Sync {
    /// Get or create state for a source.
    async fn get_or_create(
        &self,
        source: &str,
        base_interval_ms: u64,
    ) -> RateLimitResult<SourceRateState>;

    /// Apply `change` to a source's adaptive state and return the result.
    ///
    /// The read, the change and the write happen under one lock, so
    /// concurrent reports never overwrite each other.
    async fn modify(
        &self,
        source: &str,
        base_interval_ms: u64,
        change: &mut (dyn for<'s> FnMut(&'s mut SourceRateState) + Send),
    ) -> RateLimitResult<SourceRateState>;

    /// Atomically reserve the next request slot for a source.
    /// Returns how long the caller must wait before its slot begins.
    async fn reserve(&self, source: &str, base_interval_ms: u64) -> RateLimitResult<Duration>;
}
