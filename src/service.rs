//! Cached query surface over the brewery upstream.
//!
//! Every read goes through the [`ResponseCache`] first. A live answer is
//! cached under its namespace; when the upstream fails, the last cached
//! copy is served as stale if one exists. [`QueryOutcome`] keeps "nothing
//! matched" apart from "the service is degraded".

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::cache::{namespaces, CacheKey, CacheStats, ResponseCache};
use crate::http_client::{join_url, FetchOutcome, HttpClient};
use crate::rate_limit::RateLimiter;
use crate::warehouse::Warehouse;

/// Upper bound on `per_page` for interactive queries.
pub const MAX_QUERY_RESULTS: usize = 50;

/// Result of a service query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    /// Answered by the upstream just now.
    Fresh(Value),
    /// Answered from a fresh cache entry.
    Cached(Value),
    /// The upstream answered, but nothing matched.
    Empty,
    /// The upstream failed; this is the last cached answer.
    Stale {
        payload: Value,
        cached_at: DateTime<Utc>,
    },
    /// The upstream failed and nothing was cached.
    Unavailable,
}

impl QueryOutcome {
    fn answered(payload: Value, cached: bool) -> Self {
        if is_empty_payload(&payload) {
            QueryOutcome::Empty
        } else if cached {
            QueryOutcome::Cached(payload)
        } else {
            QueryOutcome::Fresh(payload)
        }
    }

    pub fn payload(&self) -> Option<&Value> {
        match self {
            QueryOutcome::Fresh(p) | QueryOutcome::Cached(p) => Some(p),
            QueryOutcome::Stale { payload, .. } => Some(payload),
            QueryOutcome::Empty | QueryOutcome::Unavailable => None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, QueryOutcome::Stale { .. } | QueryOutcome::Unavailable)
    }
}

fn is_empty_payload(payload: &Value) -> bool {
    match payload {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Geographic filters for [`BreweryService::by_location`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationFilter {
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub brewery_type: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl LocationFilter {
    /// Upstream query parameters; `None` when no filter is set.
    pub fn params(&self) -> Option<Vec<(String, String)>> {
        let mut params = Vec::new();
        let mut push = |name: &str, value: &Option<String>| {
            if let Some(v) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
                params.push((name.to_string(), v.to_string()));
            }
        };
        push("by_city", &self.city);
        push("by_state", &self.state);
        push("by_country", &self.country);
        push("by_postal", &self.postal_code);
        push("by_type", &self.brewery_type);

        if let (Some(lat), Some(lon)) = (self.latitude, self.longitude) {
            params.push(("by_dist".to_string(), format!("{},{}", lat, lon)));
        }
        if params.is_empty() {
            return None;
        }

        let limit = self.limit.unwrap_or(MAX_QUERY_RESULTS);
        params.push(("per_page".to_string(), clamp_limit(limit).to_string()));
        Some(params)
    }
}

/// Path segments under the collection that are routes, not brewery ids.
const RESERVED_SEGMENTS: &[&str] = &["meta", "random", "search", "autocomplete"];

fn is_brewery(payload: &Value, id: &str) -> bool {
    match payload.get("id") {
        Some(Value::String(found)) => found == id,
        Some(Value::Number(found)) => found.to_string() == id,
        _ => false,
    }
}

fn clamp_limit(limit: usize) -> usize {
    limit.clamp(1, MAX_QUERY_RESULTS)
}

/// Brewery lookups backed by the secondary upstream and the response cache.
#[derive(Clone)]
pub struct BreweryService {
    client: HttpClient,
    cache: Arc<ResponseCache>,
    /// Collection URL, e.g. `https://api.openbrewerydb.org/v1/breweries`.
    endpoint: String,
    warehouse: Option<Warehouse>,
}

impl BreweryService {
    pub fn new(client: HttpClient, cache: Arc<ResponseCache>, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            cache,
            endpoint: endpoint.into(),
            warehouse: None,
        }
    }

    /// Serve warehouse analytics alongside the upstream queries.
    pub fn with_warehouse(mut self, warehouse: Warehouse) -> Self {
        self.warehouse = Some(warehouse);
        self
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    /// Cache-first GET of `path` under the collection endpoint.
    async fn query(&self, namespace: &str, path: &str, params: Vec<(String, String)>) -> QueryOutcome {
        let url = join_url(&self.endpoint, path);
        let key = CacheKey::for_request(namespace, &url, params.iter().map(|(k, v)| (k, v)));

        if let Some(hit) = self.cache.lookup(&key).await {
            debug!("Serving {} from {:?} cache", key, hit.tier);
            return QueryOutcome::answered(hit.payload, true);
        }

        match self.client.request(&url, &params).await {
            FetchOutcome::Data(payload) => {
                self.cache.set(&key, payload.clone()).await;
                QueryOutcome::answered(payload, false)
            }
            FetchOutcome::Rejected { status } => {
                debug!("Upstream rejected {} with HTTP {}", url, status);
                QueryOutcome::Empty
            }
            FetchOutcome::Failed(e) => {
                warn!("Upstream failed for {}: {}", url, e);
                self.stale_or_unavailable(&key).await
            }
        }
    }

    async fn stale_or_unavailable(&self, key: &CacheKey) -> QueryOutcome {
        match self.cache.get_stale(key).await {
            Some(hit) => {
                warn!("Serving stale copy of {} cached at {}", key, hit.cached_at);
                QueryOutcome::Stale {
                    payload: hit.payload,
                    cached_at: hit.cached_at,
                }
            }
            None => QueryOutcome::Unavailable,
        }
    }

    /// Breweries whose name matches `query`, at most 50.
    pub async fn search(&self, query: &str, limit: usize) -> QueryOutcome {
        let query = query.trim();
        if query.is_empty() {
            return QueryOutcome::Empty;
        }
        let params = vec![
            ("query".to_string(), query.to_string()),
            ("per_page".to_string(), clamp_limit(limit).to_string()),
        ];
        self.query(namespaces::SEARCH, "search", params).await
    }

    /// Name suggestions for a partial query.
    pub async fn autocomplete(&self, query: &str) -> QueryOutcome {
        let query = query.trim();
        if query.is_empty() {
            return QueryOutcome::Empty;
        }
        let params = vec![("query".to_string(), query.to_string())];
        self.query(namespaces::SEARCH, "autocomplete", params).await
    }

    /// One random brewery. Never cached.
    ///
    /// The upstream answers with either an object or a one-element array.
    pub async fn random(&self) -> QueryOutcome {
        let url = join_url(&self.endpoint, "random");
        match self.client.request(&url, &[]).await {
            FetchOutcome::Data(Value::Array(items)) => match items.into_iter().next() {
                Some(item) => QueryOutcome::answered(item, false),
                None => QueryOutcome::Empty,
            },
            FetchOutcome::Data(item) => QueryOutcome::answered(item, false),
            FetchOutcome::Rejected { .. } => QueryOutcome::Empty,
            FetchOutcome::Failed(e) => {
                warn!("Random brewery lookup failed: {}", e);
                QueryOutcome::Unavailable
            }
        }
    }

    /// A single brewery; `Empty` when the upstream does not know the id.
    ///
    /// Ids that collide with other collection routes never reach the
    /// upstream, and a payload whose `id` differs from the requested one is
    /// treated as unknown.
    pub async fn by_id(&self, id: &str) -> QueryOutcome {
        let id = id.trim();
        if id.is_empty() || RESERVED_SEGMENTS.contains(&id) {
            return QueryOutcome::Empty;
        }
        let path = urlencoding::encode(id).into_owned();
        match self.query(namespaces::SEARCH, &path, Vec::new()).await {
            QueryOutcome::Fresh(p) | QueryOutcome::Cached(p) if !is_brewery(&p, id) => {
                QueryOutcome::Empty
            }
            outcome => outcome,
        }
    }

    /// Breweries matching geographic filters. `Empty` without filters.
    pub async fn by_location(&self, filter: &LocationFilter) -> QueryOutcome {
        match filter.params() {
            Some(params) => self.query(namespaces::GEOGRAPHIC, "", params).await,
            None => QueryOutcome::Empty,
        }
    }

    /// Upstream totals (`total`, `by_type`, `by_state`).
    pub async fn meta(&self) -> QueryOutcome {
        self.query(namespaces::ANALYTICS_SUMMARY, "meta", Vec::new())
            .await
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.cache.stats().await
    }

    /// Upstream reachability plus cache counters.
    ///
    /// Only healthy reports are cached, so recovery shows up on the next
    /// call instead of after the `system_status` TTL.
    pub async fn health(&self) -> QueryOutcome {
        let key = CacheKey::new(namespaces::SYSTEM_STATUS, "health");
        if let Some(hit) = self.cache.lookup(&key).await {
            return QueryOutcome::Cached(hit.payload);
        }

        let probe_url = join_url(&self.endpoint, "meta");
        let accessible = self.client.probe(&probe_url, &[]).await;
        let rate_limit = match RateLimiter::source_key(&self.endpoint) {
            Some(source) => self.client.rate_limiter().stats(&source).await,
            None => None,
        };
        let report = json!({
            "status": if accessible { "healthy" } else { "unhealthy" },
            "api_accessible": accessible,
            "last_check": Utc::now().to_rfc3339(),
            "cache_stats": self.cache.stats().await,
            "rate_limit": rate_limit,
        });

        if accessible {
            self.cache.set(&key, report.clone()).await;
        }
        QueryOutcome::Fresh(report)
    }

    /// Warehouse summary, cached under `analytics_summary`.
    pub async fn analytics_summary(&self) -> QueryOutcome {
        let Some(warehouse) = self.warehouse.clone() else {
            return QueryOutcome::Unavailable;
        };
        let key = CacheKey::new(namespaces::ANALYTICS_SUMMARY, "warehouse_summary");

        if let Some(hit) = self.cache.lookup(&key).await {
            debug!("Serving {} from {:?} cache", key, hit.tier);
            return QueryOutcome::answered(hit.payload, true);
        }

        let summary = match tokio::task::spawn_blocking(move || warehouse.summary()).await {
            Ok(Ok(summary)) => summary,
            Ok(Err(e)) => {
                warn!("Warehouse summary failed: {}", e);
                return self.stale_or_unavailable(&key).await;
            }
            Err(e) => {
                warn!("Warehouse summary task failed: {}", e);
                return self.stale_or_unavailable(&key).await;
            }
        };
        if summary.total_records == 0 {
            return QueryOutcome::Empty;
        }

        match serde_json::to_value(summary) {
            Ok(payload) => {
                self.cache.set(&key, payload.clone()).await;
                QueryOutcome::Fresh(payload)
            }
            Err(e) => {
                warn!("Warehouse summary could not be encoded: {}", e);
                self.stale_or_unavailable(&key).await
            }
        }
    }
}
