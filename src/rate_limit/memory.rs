//! In-memory rate limit backend for single-process operation.
//!
//! All state lives behind one mutex, so slot reservation and the
//! "last request" update happen in the same critical section.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::backend::{RateLimitBackend, RateLimitResult, SourceRateState};

/// Internal state for a source.
#[derive(Debug)]
struct SourceEntry {
    current_interval_ms: u64,
    /// Start time of the most recently reserved slot.
    last_slot: Option<Instant>,
    consecutive_successes: u32,
    in_backoff: bool,
    total_requests: u64,
    rate_limit_hits: u64,
}

impl SourceEntry {
    fn new(base_interval_ms: u64) -> Self {
        Self {
            current_interval_ms: base_interval_ms,
            last_slot: None,
            consecutive_successes: 0,
            in_backoff: false,
            total_requests: 0,
            rate_limit_hits: 0,
        }
    }

    fn to_state(&self, source: &str) -> SourceRateState {
        SourceRateState {
            source: source.to_string(),
            current_interval_ms: self.current_interval_ms,
            consecutive_successes: self.consecutive_successes,
            in_backoff: self.in_backoff,
            total_requests: self.total_requests,
            rate_limit_hits: self.rate_limit_hits,
        }
    }
}

/// In-memory rate limit backend.
#[derive(Clone, Default)]
pub struct InMemoryRateLimitBackend {
    sources: Arc<Mutex<HashMap<String, SourceEntry>>>,
}

impl InMemoryRateLimitBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get state snapshots for all tracked sources.
    pub async fn get_all_stats(&self) -> HashMap<String, SourceRateState> {
        let sources = self.sources.lock().await;
        sources
            .iter()
            .map(|(k, v)| (k.clone(), v.to_state(k)))
            .collect()
    }
}

#[async_trait]
impl RateLimitBackend for InMemoryRateLimitBackend {
    async fn get_or_create(
        &self,
        source: &str,
        base_interval_ms: u64,
    ) -> RateLimitResult<SourceRateState> {
        let mut sources = self.sources.lock().await;
        let entry = sources
            .entry(source.to_string())
            .or_insert_with(|| SourceEntry::new(base_interval_ms));
        Ok(entry.to_state(source))
    }

    async fn modify(
        &self,
        source: &str,
        base_interval_ms: u64,
        change: &mut (dyn for<'s> FnMut(&'s mut SourceRateState) + Send),
    ) -> RateLimitResult<SourceRateState> {
        let mut sources = self.sources.lock().await;
        let entry = sources
            .entry(source.to_string())
            .or_insert_with(|| SourceEntry::new(base_interval_ms));

        let mut state = entry.to_state(source);
        change(&mut state);
        entry.current_interval_ms = state.current_interval_ms;
        entry.consecutive_successes = state.consecutive_successes;
        entry.in_backoff = state.in_backoff;
        entry.rate_limit_hits = state.rate_limit_hits;
        Ok(state)
    }

    async fn reserve(&self, source: &str, base_interval_ms: u64) -> RateLimitResult<Duration> {
        let mut sources = self.sources.lock().await;
        let entry = sources
            .entry(source.to_string())
            .or_insert_with(|| SourceEntry::new(base_interval_ms));

        let now = Instant::now();
        let slot = match entry.last_slot {
            Some(last) => {
                let earliest = last + Duration::from_millis(entry.current_interval_ms);
                earliest.max(now)
            }
            None => now,
        };
        entry.last_slot = Some(slot);
        entry.total_requests += 1;

        Ok(slot.saturating_duration_since(now))
    }
}
