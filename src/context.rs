//! Explicitly constructed application dependencies.
//!
//! One [`AppContext`] is built from [`Settings`] at startup and handed to
//! whatever needs it. The rate limiter and response cache inside it are the
//! only process-wide shared state.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::cache::ResponseCache;
use crate::config::Settings;
use crate::extract::{ApiSource, DataSource, FallbackExtractor};
use crate::http_client::{HttpClient, ReqwestTransport, Transport};
use crate::pipeline::Pipeline;
use crate::rate_limit::RateLimiter;
use crate::service::BreweryService;
use crate::warehouse::Warehouse;

#[derive(Clone)]
pub struct AppContext {
    pub settings: Settings,
    pub client: HttpClient,
    pub cache: Arc<ResponseCache>,
    pub warehouse: Warehouse,
    pub extractor: Arc<FallbackExtractor>,
    /// Set to stop an in-flight extraction after the current page.
    pub cancel: Arc<AtomicBool>,
}

impl AppContext {
    /// Build the context with the production reqwest transport.
    pub fn from_settings(settings: Settings) -> anyhow::Result<Self> {
        let transport = ReqwestTransport::new(&settings.user_agent).map_err(anyhow::Error::msg)?;
        Self::with_transport(settings, Arc::new(transport))
    }

    /// Build the context around any transport.
    pub fn with_transport(settings: Settings, transport: Arc<dyn Transport>) -> anyhow::Result<Self> {
        let rate_limiter = RateLimiter::in_memory(settings.min_request_interval);
        let client = HttpClient::builder(settings.request_timeout)
            .transport(transport)
            .rate_limiter(rate_limiter)
            .retry_attempts(settings.retry_attempts)
            .backoff_base(settings.backoff_base)
            .build()
            .map_err(anyhow::Error::msg)?;

        let cache = Arc::new(ResponseCache::new(
            settings.cache_dir.clone(),
            settings.cache_ttls.clone(),
        ));
        let warehouse = Warehouse::open(&settings.database_path)?;

        let cancel = Arc::new(AtomicBool::new(false));
        let options = settings.collector_options();
        let primary: Arc<dyn DataSource> = Arc::new(
            ApiSource::new(settings.primary.clone(), client.clone(), options.clone())
                .with_cancel(cancel.clone()),
        );
        let secondary: Arc<dyn DataSource> = Arc::new(
            ApiSource::new(settings.secondary.clone(), client.clone(), options)
                .with_cancel(cancel.clone()),
        );
        let extractor = Arc::new(FallbackExtractor::new(primary, secondary));

        Ok(Self {
            settings,
            client,
            cache,
            warehouse,
            extractor,
            cancel,
        })
    }

    pub fn pipeline(&self) -> Pipeline {
        Pipeline::new(
            self.extractor.clone(),
            self.warehouse.clone(),
            self.settings.dedup_key,
        )
    }

    /// Query service over the secondary upstream's collection.
    pub fn service(&self) -> BreweryService {
        BreweryService::new(
            self.client.clone(),
            self.cache.clone(),
            self.settings.secondary.resource_url(),
        )
        .with_warehouse(self.warehouse.clone())
    }
}
