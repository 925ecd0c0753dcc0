//! Two-tier response cache.
//!
//! Tier 1 is a process-wide map of immutable entries; tier 2 is one JSON file
//! per fingerprint under the cache directory. Lookups check memory first,
//! fall back to disk when memory misses or holds an expired entry, and
//! repopulate memory on a disk hit. Entries are replaced wholesale, never
//! edited, so a concurrent reader always sees a complete entry.
//!
//! Disk failures of any kind degrade to a miss.

mod disk;
mod entry;
mod key;

pub use entry::{namespaces, CacheEntry, TtlPolicy, DEFAULT_TTL};
pub use key::{fingerprint, CacheKey};

use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use disk::DiskTier;

/// Source of "now" for TTL decisions.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Which tier served a hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheTier {
    Memory,
    Disk,
}

/// A cache hit, fresh or stale depending on the call that produced it.
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub payload: Value,
    pub cached_at: DateTime<Utc>,
    pub tier: CacheTier,
}

impl CacheHit {
    fn from_entry(entry: &CacheEntry, tier: CacheTier) -> Self {
        Self {
            payload: entry.payload.clone(),
            cached_at: entry.cached_at,
            tier,
        }
    }
}

/// Snapshot of cache counters and contents.
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub memory_entries: usize,
    pub memory_valid: usize,
    pub memory_expired: usize,
    pub disk_entries: usize,
    pub disk_valid: usize,
    pub disk_expired: usize,
    pub disk_bytes: u64,
    pub memory_hits: u64,
    pub disk_hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub disk_write_errors: u64,
    pub cache_dir: Option<String>,
    pub ttl_seconds: BTreeMap<String, u64>,
}

#[derive(Default)]
struct Counters {
    memory_hits: AtomicU64,
    disk_hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    disk_write_errors: AtomicU64,
}

pub struct ResponseCache {
    memory: RwLock<HashMap<CacheKey, Arc<CacheEntry>>>,
    disk: Option<DiskTier>,
    ttls: TtlPolicy,
    clock: Clock,
    counters: Counters,
}

impl ResponseCache {
    /// Cache backed by memory and the given directory.
    pub fn new(cache_dir: PathBuf, ttls: TtlPolicy) -> Self {
        Self::build(Some(DiskTier::new(cache_dir)), ttls)
    }

    /// Cache with no durable tier.
    pub fn memory_only(ttls: TtlPolicy) -> Self {
        Self::build(None, ttls)
    }

    fn build(disk: Option<DiskTier>, ttls: TtlPolicy) -> Self {
        Self {
            memory: RwLock::new(HashMap::new()),
            disk,
            ttls,
            clock: Arc::new(Utc::now),
            counters: Counters::default(),
        }
    }

    /// Replace the wall clock, for deterministic TTL checks.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn ttl_policy(&self) -> &TtlPolicy {
        &self.ttls
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    fn memory_entry(&self, key: &CacheKey) -> Option<Arc<CacheEntry>> {
        self.memory
            .read()
            .ok()
            .and_then(|guard| guard.get(key).cloned())
    }

    fn store_memory(&self, key: &CacheKey, entry: Arc<CacheEntry>) {
        if let Ok(mut guard) = self.memory.write() {
            guard.insert(key.clone(), entry);
        }
    }

    /// Fresh payload for `key`, or `None` on a miss.
    pub async fn get(&self, key: &CacheKey) -> Option<Value> {
        self.lookup(key).await.map(|hit| hit.payload)
    }

    /// Fresh entry for `key` along with the tier that served it.
    pub async fn lookup(&self, key: &CacheKey) -> Option<CacheHit> {
        let now = self.now();
        let ttl = self.ttls.ttl_for(&key.namespace);

        if let Some(entry) = self.memory_entry(key) {
            if entry.is_fresh_at(now, ttl) {
                self.counters.memory_hits.fetch_add(1, Ordering::Relaxed);
                return Some(CacheHit::from_entry(&entry, CacheTier::Memory));
            }
        }

        if let Some(disk) = &self.disk {
            if let Some(entry) = disk.read(key).await {
                if entry.is_fresh_at(now, ttl) {
                    debug!("Cache disk hit for {}", key);
                    self.counters.disk_hits.fetch_add(1, Ordering::Relaxed);
                    let hit = CacheHit::from_entry(&entry, CacheTier::Disk);
                    self.store_memory(key, Arc::new(entry));
                    return Some(hit);
                }
            }
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Most recent entry for `key` regardless of age.
    ///
    /// Used to serve degraded responses when every live source has failed.
    pub async fn get_stale(&self, key: &CacheKey) -> Option<CacheHit> {
        let memory = self.memory_entry(key);
        let disk = match &self.disk {
            Some(disk) => disk.read(key).await,
            None => None,
        };

        match (memory, disk) {
            (Some(m), Some(d)) if d.cached_at > m.cached_at => {
                Some(CacheHit::from_entry(&d, CacheTier::Disk))
            }
            (Some(m), _) => Some(CacheHit::from_entry(&m, CacheTier::Memory)),
            (None, Some(d)) => Some(CacheHit::from_entry(&d, CacheTier::Disk)),
            (None, None) => None,
        }
    }

    /// Drop expired tier-1 entries.
    ///
    /// Only done with a durable tier present, which still holds the stale
    /// copies `get_stale` falls back on.
    fn prune_memory(&self, now: DateTime<Utc>) {
        if self.disk.is_none() {
            return;
        }
        if let Ok(mut guard) = self.memory.write() {
            let before = guard.len();
            guard.retain(|k, e| e.is_fresh_at(now, self.ttls.ttl_for(&k.namespace)));
            let pruned = before - guard.len();
            if pruned > 0 {
                debug!("Evicted {} expired cache entries from memory", pruned);
            }
        }
    }

    /// Store `payload` under `key`, replacing any previous entry in both tiers.
    ///
    /// Expired memory entries are evicted on every write.
    pub async fn set(&self, key: &CacheKey, payload: Value) {
        let now = self.now();
        self.prune_memory(now);
        let entry = Arc::new(CacheEntry::new(key.fingerprint.clone(), payload, now));
        self.store_memory(key, entry.clone());
        self.counters.writes.fetch_add(1, Ordering::Relaxed);

        if let Some(disk) = &self.disk {
            if let Err(e) = disk.write(key, &entry).await {
                self.counters
                    .disk_write_errors
                    .fetch_add(1, Ordering::Relaxed);
                warn!("Cache write failed for {}: {}", key, e);
            }
        }
    }

    pub async fn invalidate(&self, key: &CacheKey) {
        if let Ok(mut guard) = self.memory.write() {
            guard.remove(key);
        }
        if let Some(disk) = &self.disk {
            if let Err(e) = disk.remove(key).await {
                warn!("Cache invalidation failed for {}: {}", key, e);
            }
        }
    }

    /// Drop every entry in both tiers.
    pub async fn clear(&self) {
        if let Ok(mut guard) = self.memory.write() {
            guard.clear();
        }
        if let Some(disk) = &self.disk {
            if let Err(e) = disk.clear().await {
                warn!("Cache clear failed under {}: {}", disk.root().display(), e);
            }
        }
    }

    /// Serve `key` from cache, or run `fetch` and cache its result.
    ///
    /// Fetch errors are returned unchanged and leave the cache untouched.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: &CacheKey, fetch: F) -> Result<Value, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, E>>,
    {
        if let Some(payload) = self.get(key).await {
            return Ok(payload);
        }
        let payload = fetch().await?;
        self.set(key, payload.clone()).await;
        Ok(payload)
    }

    pub async fn stats(&self) -> CacheStats {
        let now = self.now();

        let (memory_entries, memory_valid) = match self.memory.read() {
            Ok(guard) => {
                let valid = guard
                    .iter()
                    .filter(|(k, e)| e.is_fresh_at(now, self.ttls.ttl_for(&k.namespace)))
                    .count();
                (guard.len(), valid)
            }
            Err(_) => (0, 0),
        };

        let disk_entries = match &self.disk {
            Some(disk) => disk.scan().await,
            None => Vec::new(),
        };
        let disk_valid = disk_entries
            .iter()
            .filter(|info| info.entry.is_fresh_at(now, self.ttls.ttl_for(&info.namespace)))
            .count();

        CacheStats {
            memory_entries,
            memory_valid,
            memory_expired: memory_entries - memory_valid,
            disk_entries: disk_entries.len(),
            disk_valid,
            disk_expired: disk_entries.len() - disk_valid,
            disk_bytes: disk_entries.iter().map(|i| i.size_bytes).sum(),
            memory_hits: self.counters.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.counters.disk_hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            writes: self.counters.writes.load(Ordering::Relaxed),
            disk_write_errors: self.counters.disk_write_errors.load(Ordering::Relaxed),
            cache_dir: self
                .disk
                .as_ref()
                .map(|d| d.root().display().to_string()),
            ttl_seconds: self.ttls.as_seconds(),
        }
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("disk", &self.disk.as_ref().map(|d| d.root()))
            .field("ttls", &self.ttls)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::tempdir;

    /// Clock that only moves when told to.
    #[derive(Clone)]
    struct ManualClock(Arc<Mutex<DateTime<Utc>>>);

    impl ManualClock {
        fn new() -> Self {
            Self(Arc::new(Mutex::new(Utc::now())))
        }

        fn advance(&self, by: chrono::Duration) {
            *self.0.lock().unwrap() += by;
        }

        fn clock(&self) -> Clock {
            let inner = self.0.clone();
            Arc::new(move || *inner.lock().unwrap())
        }
    }

    fn search_key(query: &str) -> CacheKey {
        CacheKey::for_request(namespaces::SEARCH, "/breweries/search", [("query", query)])
    }

    #[tokio::test]
    async fn test_ttl_boundary_through_cache() {
        let clock = ManualClock::new();
        let ttls = TtlPolicy::uniform(Duration::from_secs(60));
        let cache = ResponseCache::memory_only(ttls).with_clock(clock.clock());
        let key = search_key("stone");

        cache.set(&key, json!(["a"])).await;
        clock.advance(chrono::Duration::seconds(60) - chrono::Duration::milliseconds(1));
        assert_eq!(cache.get(&key).await, Some(json!(["a"])));

        clock.advance(chrono::Duration::milliseconds(2));
        assert_eq!(cache.get(&key).await, None);
    }

    #[tokio::test]
    async fn test_namespaces_expire_independently() {
        let clock = ManualClock::new();
        let cache = ResponseCache::memory_only(TtlPolicy::default()).with_clock(clock.clock());
        let status = CacheKey::new(namespaces::SYSTEM_STATUS, "/health");
        let geo = CacheKey::new(namespaces::GEOGRAPHIC, "/breweries?by_state=oregon");

        cache.set(&status, json!("up")).await;
        cache.set(&geo, json!([])).await;
        clock.advance(chrono::Duration::minutes(10));

        assert!(cache.get(&status).await.is_none());
        assert!(cache.get(&geo).await.is_some());
    }

    #[tokio::test]
    async fn test_disk_tier_repopulates_memory() {
        let dir = tempdir().unwrap();
        let key = search_key("stone");

        let first = ResponseCache::new(dir.path().to_path_buf(), TtlPolicy::default());
        first.set(&key, json!([{"id": "b1"}])).await;

        // Fresh process: empty memory, same directory
        let second = ResponseCache::new(dir.path().to_path_buf(), TtlPolicy::default());
        let hit = second.lookup(&key).await.unwrap();
        assert_eq!(hit.tier, CacheTier::Disk);
        assert_eq!(hit.payload, json!([{"id": "b1"}]));

        let hit = second.lookup(&key).await.unwrap();
        assert_eq!(hit.tier, CacheTier::Memory);

        let stats = second.stats().await;
        assert_eq!(stats.disk_hits, 1);
        assert_eq!(stats.memory_hits, 1);
        assert_eq!(stats.disk_entries, 1);
    }

    #[tokio::test]
    async fn test_writes_evict_expired_memory_entries() {
        let dir = tempdir().unwrap();
        let clock = ManualClock::new();
        let cache = ResponseCache::new(dir.path().to_path_buf(), TtlPolicy::default())
            .with_clock(clock.clock());
        let old = search_key("stone");
        let geo = CacheKey::new(namespaces::GEOGRAPHIC, "/breweries?by_state=oregon");

        cache.set(&old, json!(["a"])).await;
        cache.set(&geo, json!(["b"])).await;
        clock.advance(chrono::Duration::minutes(6));
        cache.set(&search_key("lager"), json!(["c"])).await;

        let stats = cache.stats().await;
        assert_eq!(stats.memory_entries, 2);
        assert_eq!(stats.memory_expired, 0);
        // The evicted entry is still available as a stale copy
        assert_eq!(cache.get_stale(&old).await.unwrap().payload, json!(["a"]));
    }

    #[tokio::test]
    async fn test_memory_only_keeps_expired_entries_for_stale_reads() {
        let clock = ManualClock::new();
        let cache = ResponseCache::memory_only(TtlPolicy::default()).with_clock(clock.clock());
        let old = search_key("stone");

        cache.set(&old, json!(["a"])).await;
        clock.advance(chrono::Duration::minutes(6));
        cache.set(&search_key("lager"), json!(["c"])).await;

        assert!(cache.get(&old).await.is_none());
        assert!(cache.get_stale(&old).await.is_some());
    }

    #[tokio::test]
    async fn test_expired_disk_entry_is_miss() {
        let dir = tempdir().unwrap();
        let clock = ManualClock::new();
        let key = search_key("stone");

        let writer = ResponseCache::new(dir.path().to_path_buf(), TtlPolicy::default())
            .with_clock(clock.clock());
        writer.set(&key, json!([])).await;
        clock.advance(chrono::Duration::seconds(301));

        let reader = ResponseCache::new(dir.path().to_path_buf(), TtlPolicy::default())
            .with_clock(clock.clock());
        assert!(reader.get(&key).await.is_none());
        assert!(reader.get_stale(&key).await.is_some());
    }

    #[tokio::test]
    async fn test_corrupt_disk_entry_degrades_to_miss() {
        let dir = tempdir().unwrap();
        let key = search_key("stone");
        let cache = ResponseCache::new(dir.path().to_path_buf(), TtlPolicy::default());
        cache.set(&key, json!([1])).await;

        for ns in std::fs::read_dir(dir.path()).unwrap() {
            for file in std::fs::read_dir(ns.unwrap().path()).unwrap() {
                std::fs::write(file.unwrap().path(), b"garbage").unwrap();
            }
        }

        let fresh = ResponseCache::new(dir.path().to_path_buf(), TtlPolicy::default());
        assert!(fresh.get(&key).await.is_none());
        assert_eq!(fresh.stats().await.misses, 1);
    }

    #[tokio::test]
    async fn test_unwritable_disk_still_caches_in_memory() {
        let dir = tempdir().unwrap();
        // A regular file where the cache directory should be
        let blocker = dir.path().join("cache");
        std::fs::write(&blocker, b"").unwrap();

        let cache = ResponseCache::new(blocker, TtlPolicy::default());
        let key = search_key("stone");
        cache.set(&key, json!([1])).await;

        assert_eq!(cache.get(&key).await, Some(json!([1])));
        assert_eq!(cache.stats().await.disk_write_errors, 1);
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let dir = tempdir().unwrap();
        let cache = ResponseCache::new(dir.path().to_path_buf(), TtlPolicy::default());
        let a = search_key("a");
        let b = search_key("b");
        cache.set(&a, json!(1)).await;
        cache.set(&b, json!(2)).await;

        cache.invalidate(&a).await;
        assert!(cache.get(&a).await.is_none());
        assert!(cache.get_stale(&a).await.is_none());
        assert!(cache.get(&b).await.is_some());

        cache.clear().await;
        assert!(cache.get(&b).await.is_none());
        let stats = cache.stats().await;
        assert_eq!(stats.memory_entries, 0);
        assert_eq!(stats.disk_entries, 0);
    }

    #[tokio::test]
    async fn test_get_or_fetch_calls_once() {
        let cache = ResponseCache::memory_only(TtlPolicy::default());
        let key = search_key("stone");
        let calls = AtomicU64::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_fetch(&key, || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>(json!(["stone"]))
                })
                .await
                .unwrap();
            assert_eq!(value, json!(["stone"]));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_or_fetch_error_not_cached() {
        let cache = ResponseCache::memory_only(TtlPolicy::default());
        let key = search_key("stone");

        let err = cache
            .get_or_fetch(&key, || async { Err::<Value, _>("down") })
            .await;
        assert_eq!(err, Err("down"));
        assert!(cache.get_stale(&key).await.is_none());
    }

    #[tokio::test]
    async fn test_stats_counts_expired() {
        let clock = ManualClock::new();
        let cache = ResponseCache::memory_only(TtlPolicy::default()).with_clock(clock.clock());
        cache.set(&CacheKey::new(namespaces::SYSTEM_STATUS, "/h"), json!(1)).await;
        cache.set(&CacheKey::new(namespaces::ANALYTICS_SUMMARY, "/s"), json!(1)).await;
        clock.advance(chrono::Duration::minutes(6));

        let stats = cache.stats().await;
        assert_eq!(stats.memory_entries, 2);
        assert_eq!(stats.memory_valid, 1);
        assert_eq!(stats.memory_expired, 1);
        assert!(stats.cache_dir.is_none());
        assert_eq!(stats.ttl_seconds[namespaces::SEARCH], 300);
    }
}
