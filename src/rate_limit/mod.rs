//! Rate limiting for outbound requests to external sources.
//!
//! Every request to an upstream API first acquires a slot from the
//! [`RateLimiter`], which enforces a minimum spacing between requests to the
//! same host. Spacing widens when the host signals throttling and recovers
//! after a run of successes.
//!
//! Storage of the per-host state is pluggable through [`RateLimitBackend`];
//! the in-memory backend is the only one shipped, since one process owns the
//! limiter for its lifetime.

mod backend;
mod config;
mod limiter;
mod memory;

pub use backend::{RateLimitBackend, RateLimitError, RateLimitResult, SourceRateState};
pub use config::{RateLimitConfig, SourceStats};
pub use limiter::{BoxedRateLimitBackend, RateLimiter};
pub use memory::InMemoryRateLimitBackend;

use std::time::Duration;

/// Longest wait we will honour from a `Retry-After` header.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(60);

/// Parse Retry-After header value (seconds).
/// Returns duration to wait, or None if header is missing/invalid.
pub fn parse_retry_after(header_value: Option<&str>) -> Option<Duration> {
    let value = header_value?;
    value
        .trim()
        .parse::<u64>()
        .ok()
        .map(|secs| Duration::from_secs(secs).min(MAX_RETRY_AFTER))
}

/// Exponential backoff delay: `base^attempt` seconds, capped at one minute.
///
/// `attempt` is zero-based, so the first retry waits one second regardless
/// of the base.
pub fn backoff_delay(base: f64, attempt: u32) -> Duration {
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let secs = base.max(1.0).powi(exponent);
    if !secs.is_finite() || secs >= 60.0 {
        return Duration::from_secs(60);
    }
    Duration::from_secs_f64(secs)
}
