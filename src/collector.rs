//! Paginated collection over `page`/`per_page` APIs.
//!
//! Pages are fetched strictly in ascending order, one at a time. The walk
//! ends on an empty or short page, when a known total or record limit is
//! reached, or at the page ceiling. A page that fails is skipped (or ends
//! the walk, depending on [`PageErrorPolicy`]); whatever has been gathered
//! so far is always returned.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::http_client::{FetchOutcome, HttpClient};

/// Default hard ceiling on pages per collection.
pub const DEFAULT_MAX_PAGES: u32 = 50;

/// What to do when a page cannot be fetched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageErrorPolicy {
    /// Drop the page and move on to the next one.
    #[default]
    Skip,
    /// Stop and return what was collected before the failure.
    Abort,
}

impl std::str::FromStr for PageErrorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "abort" => Ok(Self::Abort),
            other => Err(format!("unknown page error policy '{}'", other)),
        }
    }
}

/// Why a collection stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EmptyPage,
    ShortPage,
    TotalReached,
    LimitReached,
    PageCeiling,
    Aborted,
    TooManyFailures,
    Cancelled,
}

/// Records gathered by one `collect_all` call.
#[derive(Debug, Clone)]
pub struct Collection {
    pub records: Vec<Value>,
    pub pages_requested: u32,
    pub failed_pages: Vec<u32>,
    pub stop_reason: StopReason,
}

impl Collection {
    /// True when every requested page produced data.
    pub fn is_complete(&self) -> bool {
        self.failed_pages.is_empty()
            && !matches!(
                self.stop_reason,
                StopReason::Aborted | StopReason::TooManyFailures | StopReason::Cancelled
            )
    }
}

#[derive(Debug, Clone)]
pub struct CollectorOptions {
    /// Largest `per_page` the upstream accepts.
    pub max_per_page: u32,
    pub max_pages: u32,
    pub on_page_error: PageErrorPolicy,
    /// Consecutive failed pages after which the upstream is considered down.
    pub max_consecutive_failures: u32,
    /// Known number of records available, if the upstream reports one.
    pub total_hint: Option<usize>,
    /// Stop once this many records have been gathered.
    pub limit: Option<usize>,
}

impl Default for CollectorOptions {
    fn default() -> Self {
        Self {
            max_per_page: 200,
            max_pages: DEFAULT_MAX_PAGES,
            on_page_error: PageErrorPolicy::Skip,
            max_consecutive_failures: 3,
            total_hint: None,
            limit: None,
        }
    }
}

enum PageResult {
    Records(Vec<Value>),
    Failed(String),
}

pub struct PaginatedCollector {
    client: HttpClient,
    source: String,
    options: CollectorOptions,
    cancel: Option<Arc<AtomicBool>>,
}

impl PaginatedCollector {
    pub fn new(client: HttpClient, source: impl Into<String>, options: CollectorOptions) -> Self {
        Self {
            client,
            source: source.into(),
            options,
            cancel: None,
        }
    }

    /// Stop before the next page once `flag` is set.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn options(&self) -> &CollectorOptions {
        &self.options
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Walk `endpoint` from page 1 and return everything collected.
    pub async fn collect_all(
        &self,
        endpoint: &str,
        fixed_params: &[(String, String)],
        page_size: u32,
    ) -> Collection {
        let per_page = page_size.clamp(1, self.options.max_per_page.max(1));
        let mut records: Vec<Value> = Vec::new();
        let mut failed_pages = Vec::new();
        let mut pages_requested = 0u32;
        let mut consecutive_failures = 0u32;
        let mut stop_reason = StopReason::PageCeiling;

        info!(
            "[{}] Collecting {} ({} per page, at most {} pages)",
            self.source, endpoint, per_page, self.options.max_pages
        );

        for page in 1..=self.options.max_pages {
            if self.cancelled() {
                info!("[{}] Collection cancelled before page {}", self.source, page);
                stop_reason = StopReason::Cancelled;
                break;
            }

            let mut params = fixed_params.to_vec();
            params.push(("page".to_string(), page.to_string()));
            params.push(("per_page".to_string(), per_page.to_string()));

            pages_requested += 1;
            let batch = match self.fetch_page(endpoint, &params, page).await {
                PageResult::Records(batch) => batch,
                PageResult::Failed(reason) => {
                    failed_pages.push(page);
                    consecutive_failures += 1;
                    warn!("[{}] Page {} failed: {}", self.source, page, reason);

                    if self.options.on_page_error == PageErrorPolicy::Abort {
                        stop_reason = StopReason::Aborted;
                        break;
                    }
                    if consecutive_failures >= self.options.max_consecutive_failures.max(1) {
                        warn!(
                            "[{}] {} consecutive page failures, giving up",
                            self.source, consecutive_failures
                        );
                        stop_reason = StopReason::TooManyFailures;
                        break;
                    }
                    continue;
                }
            };
            consecutive_failures = 0;

            let count = batch.len();
            if count == 0 {
                debug!("[{}] Page {} is empty", self.source, page);
                stop_reason = StopReason::EmptyPage;
                break;
            }
            records.extend(batch);
            debug!(
                "[{}] Page {}: {} records (total: {})",
                self.source,
                page,
                count,
                records.len()
            );

            if let Some(limit) = self.options.limit {
                if records.len() >= limit {
                    records.truncate(limit);
                    stop_reason = StopReason::LimitReached;
                    break;
                }
            }
            if let Some(total) = self.options.total_hint {
                if records.len() >= total {
                    stop_reason = StopReason::TotalReached;
                    break;
                }
            }
            if count < per_page as usize {
                stop_reason = StopReason::ShortPage;
                break;
            }
        }

        if stop_reason == StopReason::PageCeiling {
            warn!(
                "[{}] Reached page ceiling ({}) for {}",
                self.source, self.options.max_pages, endpoint
            );
        }

        info!(
            "[{}] Collected {} records from {} pages ({} failed)",
            self.source,
            records.len(),
            pages_requested,
            failed_pages.len()
        );

        Collection {
            records,
            pages_requested,
            failed_pages,
            stop_reason,
        }
    }

    /// Fetch one page, giving a failed request one more round of attempts.
    async fn fetch_page(&self, endpoint: &str, params: &[(String, String)], page: u32) -> PageResult {
        let mut outcome = self.client.request(endpoint, params).await;
        if outcome.is_failed() {
            debug!("[{}] Retrying page {} once more", self.source, page);
            outcome = self.client.request(endpoint, params).await;
        }

        match outcome {
            FetchOutcome::Data(Value::Array(items)) => PageResult::Records(items),
            FetchOutcome::Data(other) => PageResult::Failed(format!(
                "expected a JSON array, got {}",
                json_kind(&other)
            )),
            FetchOutcome::Rejected { status } => PageResult::Failed(format!("HTTP {}", status)),
            FetchOutcome::Failed(e) => PageResult::Failed(e.to_string()),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::mock::{param, test_client, MockTransport};
    use crate::http_client::{RawResponse, TransportError};
    use serde_json::json;

    const ENDPOINT: &str = "https://api.example.test/v1/breweries";

    /// The page of a `total`-record upstream selected by `query`.
    fn page_of(total: usize, query: &[(String, String)]) -> RawResponse {
        let page: usize = param(query, "page").unwrap().parse().unwrap();
        let per_page: usize = param(query, "per_page").unwrap().parse().unwrap();
        let start = (page - 1) * per_page;
        let items: Vec<Value> = (start..total.min(start + per_page))
            .map(|i| json!({"id": i}))
            .collect();
        RawResponse::json_ok(&Value::Array(items))
    }

    fn paged_source(total: usize) -> Arc<MockTransport> {
        MockTransport::new(move |_, query| Ok(page_of(total, query)))
    }

    fn collector(transport: Arc<MockTransport>, options: CollectorOptions) -> PaginatedCollector {
        PaginatedCollector::new(test_client(transport), "test", options)
    }

    fn ids(collection: &Collection) -> Vec<u64> {
        collection
            .records
            .iter()
            .map(|r| r["id"].as_u64().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_collects_exactly_n_records() {
        for (total, per_page) in [(95usize, 10u32), (7, 3), (1, 50), (199, 20)] {
            let transport = paged_source(total);
            let result = collector(transport.clone(), CollectorOptions::default())
                .collect_all(ENDPOINT, &[], per_page)
                .await;

            let expected_pages = total.div_ceil(per_page as usize);
            assert_eq!(result.records.len(), total);
            assert_eq!(transport.call_count(), expected_pages);
            assert_eq!(result.pages_requested as usize, expected_pages);
            assert_eq!(result.stop_reason, StopReason::ShortPage);
            assert!(result.is_complete());
        }
    }

    #[tokio::test]
    async fn test_pages_requested_in_order_with_fixed_params() {
        let transport = paged_source(25);
        let fixed = vec![("by_type".to_string(), "micro".to_string())];
        collector(transport.clone(), CollectorOptions::default())
            .collect_all(ENDPOINT, &fixed, 10)
            .await;

        let calls = transport.calls();
        let pages: Vec<&str> = calls.iter().map(|(_, q)| param(q, "page").unwrap()).collect();
        assert_eq!(pages, vec!["1", "2", "3"]);
        assert!(calls.iter().all(|(_, q)| param(q, "by_type") == Some("micro")));
    }

    #[tokio::test]
    async fn test_exact_multiple_needs_empty_page_without_hint() {
        let transport = paged_source(30);
        let result = collector(transport.clone(), CollectorOptions::default())
            .collect_all(ENDPOINT, &[], 10)
            .await;

        assert_eq!(result.records.len(), 30);
        assert_eq!(transport.call_count(), 4);
        assert_eq!(result.stop_reason, StopReason::EmptyPage);
    }

    #[tokio::test]
    async fn test_total_hint_avoids_trailing_request() {
        let transport = paged_source(30);
        let options = CollectorOptions {
            total_hint: Some(30),
            ..Default::default()
        };
        let result = collector(transport.clone(), options)
            .collect_all(ENDPOINT, &[], 10)
            .await;

        assert_eq!(result.records.len(), 30);
        assert_eq!(transport.call_count(), 3);
        assert_eq!(result.stop_reason, StopReason::TotalReached);
    }

    #[tokio::test]
    async fn test_page_ceiling_bounds_misbehaving_upstream() {
        // Always returns a full page
        let transport = MockTransport::new(|_, query| {
            let per_page: usize = param(query, "per_page").unwrap().parse().unwrap();
            let items: Vec<Value> = (0..per_page).map(|i| json!({"id": i})).collect();
            Ok(RawResponse::json_ok(&Value::Array(items)))
        });
        let options = CollectorOptions {
            max_pages: 5,
            ..Default::default()
        };
        let result = collector(transport.clone(), options)
            .collect_all(ENDPOINT, &[], 4)
            .await;

        assert_eq!(transport.call_count(), 5);
        assert_eq!(result.records.len(), 20);
        assert_eq!(result.stop_reason, StopReason::PageCeiling);
    }

    #[tokio::test]
    async fn test_page_size_clamped_to_source_max() {
        let transport = paged_source(10);
        let options = CollectorOptions {
            max_per_page: 80,
            ..Default::default()
        };
        collector(transport.clone(), options)
            .collect_all(ENDPOINT, &[], 500)
            .await;

        assert_eq!(param(&transport.calls()[0].1, "per_page"), Some("80"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_middle_page_is_skipped() {
        let transport = MockTransport::new(|_, query| {
            if param(query, "page") == Some("3") {
                return Err(TransportError::Timeout);
            }
            Ok(page_of(45, query))
        });
        let result = collector(transport.clone(), CollectorOptions::default())
            .collect_all(ENDPOINT, &[], 10)
            .await;

        let expected: Vec<u64> = (0..20).chain(30..45).collect();
        assert_eq!(ids(&result), expected);
        assert_eq!(result.failed_pages, vec![3]);
        assert_eq!(result.pages_requested, 5);
        assert_eq!(result.stop_reason, StopReason::ShortPage);
        assert!(!result.is_complete());

        // Page 3: three attempts, then one more round of three
        let page3 = transport
            .calls()
            .iter()
            .filter(|(_, q)| param(q, "page") == Some("3"))
            .count();
        assert_eq!(page3, 6);
    }

    #[tokio::test]
    async fn test_rejected_page_skipped_without_retry() {
        let transport = MockTransport::new(|_, query| match param(query, "page") {
            Some("1") => Ok(RawResponse::json_ok(&json!([{"id": 1}, {"id": 2}]))),
            Some("2") => Ok(RawResponse::new(404, b"{}".to_vec())),
            _ => Ok(RawResponse::json_ok(&json!([{"id": 3}]))),
        });
        let result = collector(transport.clone(), CollectorOptions::default())
            .collect_all(ENDPOINT, &[], 2)
            .await;

        assert_eq!(ids(&result), vec![1, 2, 3]);
        assert_eq!(result.failed_pages, vec![2]);
        assert_eq!(transport.call_count(), 3);
    }

    #[tokio::test]
    async fn test_abort_policy_returns_partial() {
        let transport = MockTransport::new(|_, query| match param(query, "page") {
            Some("1") => Ok(RawResponse::json_ok(&json!([{"id": 1}, {"id": 2}]))),
            _ => Ok(RawResponse::new(400, Vec::new())),
        });
        let options = CollectorOptions {
            on_page_error: PageErrorPolicy::Abort,
            ..Default::default()
        };
        let result = collector(transport.clone(), options)
            .collect_all(ENDPOINT, &[], 2)
            .await;

        assert_eq!(ids(&result), vec![1, 2]);
        assert_eq!(result.stop_reason, StopReason::Aborted);
        assert_eq!(transport.call_count(), 2);
    }

    #[tokio::test]
    async fn test_consecutive_failures_stop_walk() {
        let transport = MockTransport::new(|_, _| Ok(RawResponse::new(403, Vec::new())));
        let result = collector(transport.clone(), CollectorOptions::default())
            .collect_all(ENDPOINT, &[], 10)
            .await;

        assert!(result.records.is_empty());
        assert_eq!(result.failed_pages, vec![1, 2, 3]);
        assert_eq!(result.stop_reason, StopReason::TooManyFailures);
    }

    #[tokio::test]
    async fn test_record_limit_truncates() {
        let transport = paged_source(100);
        let options = CollectorOptions {
            limit: Some(25),
            ..Default::default()
        };
        let result = collector(transport.clone(), options)
            .collect_all(ENDPOINT, &[], 10)
            .await;

        assert_eq!(result.records.len(), 25);
        assert_eq!(transport.call_count(), 3);
        assert_eq!(result.stop_reason, StopReason::LimitReached);
    }

    #[tokio::test]
    async fn test_non_array_page_counts_as_failure() {
        let transport = MockTransport::new(|_, query| match param(query, "page") {
            Some("1") => Ok(RawResponse::json_ok(&json!({"message": "nope"}))),
            _ => Ok(RawResponse::json_ok(&json!([{"id": 9}]))),
        });
        let result = collector(transport, CollectorOptions::default())
            .collect_all(ENDPOINT, &[], 10)
            .await;

        assert_eq!(ids(&result), vec![9]);
        assert_eq!(result.failed_pages, vec![1]);
    }

    #[tokio::test]
    async fn test_cancellation_checked_between_pages() {
        let flag = Arc::new(AtomicBool::new(false));
        let trip = flag.clone();
        let transport = MockTransport::new(move |_, _| {
            trip.store(true, Ordering::Relaxed);
            Ok(RawResponse::json_ok(&json!([{"id": 1}, {"id": 2}])))
        });
        let result = collector(transport.clone(), CollectorOptions::default())
            .with_cancel(flag)
            .collect_all(ENDPOINT, &[], 2)
            .await;

        assert_eq!(transport.call_count(), 1);
        assert_eq!(result.records.len(), 2);
        assert_eq!(result.stop_reason, StopReason::Cancelled);
    }

    #[test]
    fn test_policy_parse() {
        assert_eq!("skip".parse::<PageErrorPolicy>(), Ok(PageErrorPolicy::Skip));
        assert_eq!("ABORT".parse::<PageErrorPolicy>(), Ok(PageErrorPolicy::Abort));
        assert!("later".parse::<PageErrorPolicy>().is_err());
    }
}
