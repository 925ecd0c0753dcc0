//! Cache entries and TTL policy.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Well-known cache namespaces.
pub mod namespaces {
    pub const ANALYTICS_SUMMARY: &str = "analytics_summary";
    pub const BREWERY_ANALYTICS: &str = "brewery_analytics";
    pub const SYSTEM_STATUS: &str = "system_status";
    pub const GEOGRAPHIC: &str = "geographic_data";
    pub const SEARCH: &str = "search";
}

/// TTL used for namespaces without an explicit setting.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// An immutable cached payload. Entries are replaced, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub fingerprint: String,
    pub payload: Value,
    pub cached_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(fingerprint: String, payload: Value, cached_at: DateTime<Utc>) -> Self {
        Self {
            fingerprint,
            payload,
            cached_at,
        }
    }

    /// Valid while `now - cached_at < ttl`.
    pub fn is_fresh_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => now.signed_duration_since(self.cached_at) < ttl,
            Err(_) => true,
        }
    }

    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.cached_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

/// Per-namespace time-to-live lookup.
#[derive(Debug, Clone)]
pub struct TtlPolicy {
    ttls: HashMap<String, Duration>,
    fallback: Duration,
}

impl Default for TtlPolicy {
    fn default() -> Self {
        let ttls = [
            (namespaces::ANALYTICS_SUMMARY, 3600),
            (namespaces::BREWERY_ANALYTICS, 1800),
            (namespaces::SYSTEM_STATUS, 300),
            (namespaces::GEOGRAPHIC, 7200),
            (namespaces::SEARCH, 300),
        ]
        .into_iter()
        .map(|(ns, secs)| (ns.to_string(), Duration::from_secs(secs)))
        .collect();

        Self {
            ttls,
            fallback: DEFAULT_TTL,
        }
    }
}

impl TtlPolicy {
    /// Empty policy: every namespace uses `fallback`.
    pub fn uniform(fallback: Duration) -> Self {
        Self {
            ttls: HashMap::new(),
            fallback,
        }
    }

    pub fn with_ttl(mut self, namespace: &str, ttl: Duration) -> Self {
        self.ttls.insert(namespace.to_string(), ttl);
        self
    }

    pub fn ttl_for(&self, namespace: &str) -> Duration {
        self.ttls.get(namespace).copied().unwrap_or(self.fallback)
    }

    /// Configured TTLs in seconds, for reporting.
    pub fn as_seconds(&self) -> BTreeMap<String, u64> {
        self.ttls
            .iter()
            .map(|(k, v)| (k.clone(), v.as_secs()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ttl_boundary() {
        let written = Utc::now();
        let entry = CacheEntry::new("/x".into(), json!(1), written);
        let ttl = Duration::from_secs(300);
        let epsilon = chrono::Duration::milliseconds(1);
        let ttl_c = chrono::Duration::seconds(300);

        assert!(entry.is_fresh_at(written, ttl));
        assert!(entry.is_fresh_at(written + ttl_c - epsilon, ttl));
        assert!(!entry.is_fresh_at(written + ttl_c, ttl));
        assert!(!entry.is_fresh_at(written + ttl_c + epsilon, ttl));
    }

    #[test]
    fn test_namespace_ttls() {
        let policy = TtlPolicy::default();
        assert_eq!(
            policy.ttl_for(namespaces::ANALYTICS_SUMMARY),
            Duration::from_secs(3600)
        );
        assert_eq!(
            policy.ttl_for(namespaces::SYSTEM_STATUS),
            Duration::from_secs(300)
        );
        assert_eq!(
            policy.ttl_for(namespaces::GEOGRAPHIC),
            Duration::from_secs(7200)
        );
        assert_eq!(policy.ttl_for("unheard_of"), DEFAULT_TTL);
    }

    #[test]
    fn test_override_ttl() {
        let policy = TtlPolicy::default().with_ttl(namespaces::SEARCH, Duration::from_secs(5));
        assert_eq!(policy.ttl_for(namespaces::SEARCH), Duration::from_secs(5));
        assert_eq!(policy.as_seconds()[namespaces::SEARCH], 5);
    }
}
