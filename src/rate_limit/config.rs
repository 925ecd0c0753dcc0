//! Rate limiter configuration and types.

use std::time::Duration;

/// Configuration for rate limiting behavior.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Minimum spacing between two requests to the same source.
    pub min_interval: Duration,
    /// Maximum spacing (ceiling for backoff).
    pub max_interval: Duration,
    /// Multiplier applied to the interval when a source throttles us.
    pub backoff_multiplier: f64,
    /// Multiplier applied on recovery (< 1.0 to shrink the interval).
    pub recovery_multiplier: f64,
    /// Number of consecutive successes before shrinking the interval.
    pub recovery_threshold: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(100),
            max_interval: Duration::from_secs(60),
            backoff_multiplier: 2.0,
            recovery_multiplier: 0.8,
            recovery_threshold: 5,
        }
    }
}

impl RateLimitConfig {
    /// Config with the given base spacing and default adaptive behaviour.
    pub fn with_min_interval(min_interval: Duration) -> Self {
        Self {
            min_interval,
            ..Default::default()
        }
    }
}

/// Statistics for a source.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SourceStats {
    pub current_interval_ms: u64,
    pub in_backoff: bool,
    pub total_requests: u64,
    pub rate_limit_hits: u64,
}
