//! Upstream sources and the HTTP-backed implementation.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::collector::{Collection, CollectorOptions, PaginatedCollector};
use crate::http_client::{join_url, FetchOutcome, HttpClient};
use crate::transform::{adapt_beer, adapt_brewery, AdaptError, NormalizedRecord, SourceTag};

/// Something records can be extracted from.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Short name used in logs and reports.
    fn name(&self) -> &str;

    /// Tag stamped on every record this source produces.
    fn tag(&self) -> SourceTag;

    /// Cheap reachability check.
    async fn test_connectivity(&self) -> bool;

    /// Raw records, at most `limit` when given.
    async fn fetch(&self, limit: Option<usize>) -> Collection;

    /// Map one raw record into the canonical shape. Must be pure.
    fn adapt(&self, raw: &Value, processed_at: DateTime<Utc>)
        -> Result<NormalizedRecord, AdaptError>;
}

/// Payload schema of an upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Punk API beers.
    Punk,
    /// Open Brewery DB breweries.
    OpenBrewery,
}

impl SourceKind {
    pub fn tag(&self) -> SourceTag {
        match self {
            SourceKind::Punk => SourceTag::PunkApi,
            SourceKind::OpenBrewery => SourceTag::OpenBreweryDb,
        }
    }
}

/// Where and how to reach one upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub kind: SourceKind,
    pub base_url: String,
    /// Collection path under `base_url`, e.g. `beers`.
    pub resource: String,
    pub max_per_page: u32,
    /// Path probed by `test_connectivity`.
    pub probe_path: String,
    #[serde(default)]
    pub probe_params: Vec<(String, String)>,
    /// Fixed filters sent with every extraction page.
    #[serde(default)]
    pub filters: Vec<(String, String)>,
    /// Path returning `{"total": n}` for the collection, if the upstream has one.
    #[serde(default)]
    pub meta_path: Option<String>,
}

impl SourceConfig {
    pub fn punk() -> Self {
        Self {
            name: "punk".to_string(),
            kind: SourceKind::Punk,
            base_url: "https://api.punkapi.com/v2".to_string(),
            resource: "beers".to_string(),
            max_per_page: 80,
            probe_path: "beers/1".to_string(),
            probe_params: Vec::new(),
            filters: Vec::new(),
            meta_path: None,
        }
    }

    pub fn open_brewery() -> Self {
        Self {
            name: "openbrewery".to_string(),
            kind: SourceKind::OpenBrewery,
            base_url: "https://api.openbrewerydb.org/v1".to_string(),
            resource: "breweries".to_string(),
            max_per_page: 200,
            probe_path: "breweries".to_string(),
            probe_params: vec![("per_page".to_string(), "1".to_string())],
            filters: vec![(
                "by_type".to_string(),
                "micro,nano,regional,brewpub".to_string(),
            )],
            meta_path: Some("breweries/meta".to_string()),
        }
    }

    pub fn resource_url(&self) -> String {
        join_url(&self.base_url, &self.resource)
    }
}

/// A [`DataSource`] backed by a paginated REST API.
pub struct ApiSource {
    config: SourceConfig,
    client: HttpClient,
    options: CollectorOptions,
    cancel: Option<Arc<AtomicBool>>,
}

impl ApiSource {
    pub fn new(config: SourceConfig, client: HttpClient, options: CollectorOptions) -> Self {
        Self {
            config,
            client,
            options,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn config(&self) -> &SourceConfig {
        &self.config
    }

    /// Total reported by the meta endpoint, if configured and answering.
    async fn total_hint(&self) -> Option<usize> {
        let path = self.config.meta_path.as_ref()?;
        let url = join_url(&self.config.base_url, path);
        let outcome = self.client.request(&url, &self.config.filters).await;
        let total = match outcome {
            FetchOutcome::Data(meta) => meta.get("total").and_then(|t| {
                t.as_u64()
                    .or_else(|| t.as_str().and_then(|s| s.parse().ok()))
            }),
            _ => None,
        };
        debug!("[{}] Meta total: {:?}", self.config.name, total);
        total.map(|t| t as usize)
    }
}

#[async_trait]
impl DataSource for ApiSource {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn tag(&self) -> SourceTag {
        self.config.kind.tag()
    }

    async fn test_connectivity(&self) -> bool {
        let url = join_url(&self.config.base_url, &self.config.probe_path);
        let reachable = self.client.probe(&url, &self.config.probe_params).await;
        info!(
            "[{}] Connectivity check: {}",
            self.config.name,
            if reachable { "reachable" } else { "unreachable" }
        );
        reachable
    }

    async fn fetch(&self, limit: Option<usize>) -> Collection {
        let mut options = self.options.clone();
        options.max_per_page = self.config.max_per_page;
        options.limit = limit;
        options.total_hint = self.total_hint().await;

        let page_size = limit
            .map(|l| l.min(self.config.max_per_page as usize) as u32)
            .unwrap_or(self.config.max_per_page);

        let mut collector = PaginatedCollector::new(self.client.clone(), &self.config.name, options);
        if let Some(flag) = &self.cancel {
            collector = collector.with_cancel(flag.clone());
        }
        collector
            .collect_all(&self.config.resource_url(), &self.config.filters, page_size)
            .await
    }

    fn adapt(
        &self,
        raw: &Value,
        processed_at: DateTime<Utc>,
    ) -> Result<NormalizedRecord, AdaptError> {
        match self.config.kind {
            SourceKind::Punk => adapt_beer(raw, processed_at),
            SourceKind::OpenBrewery => adapt_brewery(raw, processed_at),
        }
    }
}
