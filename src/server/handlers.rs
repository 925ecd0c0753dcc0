//! HTTP request handlers for the web server.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::AppState;
use crate::service::{LocationFilter, QueryOutcome};

const DEFAULT_SEARCH_LIMIT: usize = 20;

/// Wrap an outcome as `{status, source, data}`.
///
/// `Empty` answers 200 with an empty list unless `empty_status` says
/// otherwise; `Unavailable` answers 503.
fn envelope(outcome: QueryOutcome, empty_status: StatusCode) -> Response {
    let (code, status, source, data, cached_at) = match outcome {
        QueryOutcome::Fresh(data) => (StatusCode::OK, "ok", "live", data, None),
        QueryOutcome::Cached(data) => (StatusCode::OK, "ok", "cache", data, None),
        QueryOutcome::Empty => (empty_status, "empty", "live", json!([]), None),
        QueryOutcome::Stale { payload, cached_at } => {
            (StatusCode::OK, "degraded", "stale", payload, Some(cached_at))
        }
        QueryOutcome::Unavailable => (
            StatusCode::SERVICE_UNAVAILABLE,
            "degraded",
            "stale",
            Value::Null,
            None,
        ),
    };

    let mut body = json!({
        "status": status,
        "source": source,
        "data": data,
    });
    if let Some(at) = cached_at {
        body["cached_at"] = json!(at.to_rfc3339());
    }
    (code, Json(body)).into_response()
}

fn respond(outcome: QueryOutcome) -> Response {
    envelope(outcome, StatusCode::OK)
}

fn bad_request(message: &str) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}

/// Search parameters. `q` and `query` are accepted interchangeably.
#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub query: Option<String>,
    pub limit: Option<usize>,
}

impl SearchParams {
    fn text(&self) -> Option<&str> {
        self.q
            .as_deref()
            .or(self.query.as_deref())
            .map(str::trim)
            .filter(|q| !q.is_empty())
    }
}

pub async fn health(State(state): State<AppState>) -> Response {
    respond(state.service.health().await)
}

pub async fn search(State(state): State<AppState>, Query(params): Query<SearchParams>) -> Response {
    let Some(text) = params.text() else {
        return bad_request("Query parameter required");
    };
    let limit = params.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    respond(state.service.search(text, limit).await)
}

pub async fn autocomplete(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Response {
    match params.text() {
        Some(text) => respond(state.service.autocomplete(text).await),
        None => respond(QueryOutcome::Empty),
    }
}

pub async fn random(State(state): State<AppState>) -> Response {
    envelope(state.service.random().await, StatusCode::NOT_FOUND)
}

pub async fn brewery(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    envelope(state.service.by_id(&id).await, StatusCode::NOT_FOUND)
}

pub async fn geographic(
    State(state): State<AppState>,
    Query(filter): Query<LocationFilter>,
) -> Response {
    if filter.params().is_none() {
        return bad_request("No search parameters provided");
    }
    respond(state.service.by_location(&filter).await)
}

pub async fn meta(State(state): State<AppState>) -> Response {
    respond(state.service.meta().await)
}

pub async fn cache_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.service.cache_stats().await)
}

pub async fn cache_clear(State(state): State<AppState>) -> impl IntoResponse {
    state.service.cache().clear().await;
    tracing::info!("Response cache cleared over HTTP");
    Json(json!({ "status": "ok", "cleared": true }))
}

pub async fn analytics_summary(State(state): State<AppState>) -> Response {
    respond(state.service.analytics_summary().await)
}
