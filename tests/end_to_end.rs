//! End-to-end runs against a scripted upstream.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tempfile::tempdir;
use tower::ServiceExt;

use brewpipe::config::Settings;
use brewpipe::context::AppContext;
use brewpipe::http_client::{RawResponse, Transport, TransportError};
use brewpipe::server::{create_router, AppState};
use brewpipe::transform::SourceTag;
use brewpipe::warehouse::WriteMode;

/// Punk API down, Open Brewery DB serving three breweries.
struct FakeUpstream {
    calls: Mutex<Vec<String>>,
}

impl FakeUpstream {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls_to(&self, suffix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|url| url.ends_with(suffix))
            .count()
    }

    fn breweries() -> Value {
        json!([
            {"id": "b1", "name": "Hop Hollow", "brewery_type": "micro", "city": "Bend", "state": "Oregon"},
            {"id": "b2", "name": "Lager Lane", "brewery_type": "regional", "city": "Austin", "state": "Texas"},
            {"id": "b3", "name": "Pub Corner", "brewery_type": "brewpub", "city": "Denver", "state": "Colorado"},
        ])
    }
}

fn param<'a>(query: &'a [(String, String)], name: &str) -> Option<&'a str> {
    query
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

#[async_trait]
impl Transport for FakeUpstream {
    async fn get(
        &self,
        url: &str,
        query: &[(String, String)],
        _timeout: Duration,
    ) -> Result<RawResponse, TransportError> {
        self.calls.lock().unwrap().push(url.to_string());

        if url.contains("punkapi") {
            return Err(TransportError::Connect("connection refused".to_string()));
        }
        if url.ends_with("/meta") {
            return Ok(RawResponse::json_ok(&json!({"total": 3})));
        }
        if url.ends_with("/search") {
            return Ok(RawResponse::json_ok(&json!([{"id": "b1", "name": "Hop Hollow"}])));
        }
        if url.ends_with("/breweries") {
            let page: usize = param(query, "page").and_then(|p| p.parse().ok()).unwrap_or(1);
            let per_page: usize = param(query, "per_page")
                .and_then(|p| p.parse().ok())
                .unwrap_or(50);
            let all = Self::breweries();
            let items: Vec<Value> = all
                .as_array()
                .unwrap()
                .iter()
                .skip((page - 1) * per_page)
                .take(per_page)
                .cloned()
                .collect();
            return Ok(RawResponse::json_ok(&Value::Array(items)));
        }
        Ok(RawResponse::new(404, Vec::new()))
    }
}

fn settings(dir: &std::path::Path) -> Settings {
    let mut settings = Settings::with_data_dir(dir.to_path_buf());
    settings.min_request_interval = Duration::ZERO;
    settings.retry_attempts = 1;
    settings
}

#[tokio::test]
async fn test_fallback_run_loads_secondary_records() {
    let dir = tempdir().unwrap();
    let upstream = FakeUpstream::new();
    let ctx = AppContext::with_transport(settings(dir.path()), upstream.clone()).unwrap();
    let pipeline = ctx.pipeline();

    let report = pipeline.run(None, WriteMode::ReplaceAll).await.unwrap();
    assert!(report.extraction.used_fallback());
    assert_eq!(report.extraction.served_by.as_deref(), Some("openbrewery"));
    assert_eq!(report.extraction.tag, Some(SourceTag::OpenBreweryDb));
    assert_eq!(report.extracted, 3);
    assert_eq!(report.load.as_ref().unwrap().written, 3);

    let stored = ctx.warehouse.records().unwrap();
    assert_eq!(stored.len(), 3);
    assert!(stored.iter().all(|r| r.data_source == SourceTag::OpenBreweryDb));
    assert_eq!(stored[0].beer_id, "brewery_b1");

    // The meta total lets the collector stop without an empty trailing page
    let summary = ctx.warehouse.summary().unwrap();
    assert_eq!(summary.total_records, 3);

    // An append of the same data is collapsed back to one row per record
    let report = pipeline.run(None, WriteMode::Append).await.unwrap();
    assert_eq!(report.dedup.unwrap().after, 3);
    assert_eq!(ctx.warehouse.count().unwrap(), 3);
}

#[tokio::test]
async fn test_http_surface_caches_search() {
    let dir = tempdir().unwrap();
    let upstream = FakeUpstream::new();
    let ctx = AppContext::with_transport(settings(dir.path()), upstream.clone()).unwrap();
    let app = create_router(AppState::new(ctx.service()));

    for expected_source in ["live", "cache"] {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/search?q=hop&limit=5")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["source"], expected_source);
        assert_eq!(json["data"][0]["name"], "Hop Hollow");
    }
    assert_eq!(upstream.calls_to("/search"), 1);

    // The disk tier survives a fresh context
    let reopened = AppContext::with_transport(settings(dir.path()), upstream.clone()).unwrap();
    let stats = reopened.cache.stats().await;
    assert_eq!(stats.disk_entries, 1);
    assert_eq!(stats.memory_entries, 0);
}

#[tokio::test]
async fn test_analytics_summary_after_run() {
    let dir = tempdir().unwrap();
    let upstream = FakeUpstream::new();
    let ctx = AppContext::with_transport(settings(dir.path()), upstream).unwrap();
    ctx.pipeline().run(None, WriteMode::ReplaceAll).await.unwrap();

    let app = create_router(AppState::new(ctx.service()));
    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/analytics/summary")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["data"]["total_records"], 3);
    assert_eq!(json["data"]["by_source"]["openbrewery_db"], 3);
}
