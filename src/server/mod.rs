//! HTTP front for the brewery query service.
//!
//! Handlers are thin: each one calls [`BreweryService`] and wraps the
//! [`QueryOutcome`](crate::service::QueryOutcome) in a JSON envelope.

mod handlers;
mod routes;

pub use routes::create_router;

use std::net::SocketAddr;

use crate::context::AppContext;
use crate::service::BreweryService;

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub service: BreweryService,
}

impl AppState {
    pub fn new(service: BreweryService) -> Self {
        Self { service }
    }
}

/// Start the web server.
pub async fn serve(ctx: &AppContext, host: &str, port: u16) -> anyhow::Result<()> {
    let app = create_router(AppState::new(ctx.service()));

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
