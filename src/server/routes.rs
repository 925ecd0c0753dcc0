//! Router configuration for the web server.

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;

use super::handlers;
use super::AppState;

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        // Upstream queries
        .route("/api/search", get(handlers::search))
        .route("/api/autocomplete", get(handlers::autocomplete))
        .route("/api/random", get(handlers::random))
        .route("/api/breweries/:id", get(handlers::brewery))
        .route("/api/geographic", get(handlers::geographic))
        .route("/api/meta", get(handlers::meta))
        // Cache management
        .route("/api/cache/stats", get(handlers::cache_stats))
        .route("/api/cache/clear", post(handlers::cache_clear))
        // Warehouse analytics
        .route("/api/analytics/summary", get(handlers::analytics_summary))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
