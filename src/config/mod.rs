//! Configuration management using the prefer crate.
//!
//! A config file (TOML, YAML or JSON, chosen by extension) is either passed
//! explicitly or discovered by `prefer`. Its values are folded into
//! [`Settings`], then `BREWPIPE_*` environment variables and command-line
//! overrides are applied on top.

mod settings;

pub use settings::{Settings, SettingsView, DEFAULT_DATABASE_FILENAME};

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::collector::PageErrorPolicy;
use crate::dedup::DedupKeyStrategy;
use crate::extract::SourceConfig;

/// Partial override of a source's connection details.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_per_page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta_path: Option<String>,
    /// Replaces the fixed extraction filters.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<BTreeMap<String, String>>,
}

impl SourceOverride {
    fn apply(&self, source: &mut SourceConfig) {
        if let Some(ref url) = self.base_url {
            source.base_url = url.clone();
        }
        if let Some(ref resource) = self.resource {
            source.resource = resource.clone();
        }
        if let Some(max) = self.max_per_page {
            source.max_per_page = max.max(1);
        }
        if let Some(ref probe) = self.probe_path {
            source.probe_path = probe.clone();
        }
        if let Some(ref meta) = self.meta_path {
            source.meta_path = (!meta.is_empty()).then(|| meta.clone());
        }
        if let Some(ref filters) = self.filters {
            source.filters = filters
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
        }
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Data directory path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Cache directory (default: `<data_dir>/cache`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<String>,
    /// Warehouse database file (default: `<data_dir>/warehouse.db`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_base: Option<f64>,
    /// Minimum delay between requests to one host, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_request_interval_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_consecutive_failures: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_page_error: Option<PageErrorPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedup_key: Option<DedupKeyStrategy>,
    /// Cache TTL per namespace, in seconds.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub cache_ttls: HashMap<String, u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary: Option<SourceOverride>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary: Option<SourceOverride>,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Falls back to defaults when no config file is found.
    pub async fn load() -> Self {
        match prefer::load("brewpipe").await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => match Self::load_from_path(path).await {
                    Ok(config) => config,
                    Err(e) => {
                        tracing::warn!("Ignoring config at {}: {}", path.display(), e);
                        Self::default()
                    }
                },
                None => Self::default(),
            },
            Err(_) => {
                tracing::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML and YAML based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let mut config = Self::parse(&contents, ext)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Parse config text in the format named by `ext`.
    pub fn parse(contents: &str, ext: &str) -> Result<Self, String> {
        match ext {
            "toml" => {
                toml::from_str(contents).map_err(|e| format!("Failed to parse TOML config: {}", e))
            }
            "yaml" | "yml" => serde_yaml::from_str(contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e)),
            _ => serde_json::from_str(contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e)),
        }
    }

    /// Config file's parent directory, if loaded from a file.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved against `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.set_data_dir(self.resolve_path(data_dir, base_dir));
        }
        if let Some(ref cache_dir) = self.cache_dir {
            settings.cache_dir = self.resolve_path(cache_dir, base_dir);
        }
        if let Some(ref database) = self.database {
            settings.database_path = self.resolve_path(database, &settings.data_dir);
        }
        if let Some(ref user_agent) = self.user_agent {
            settings.user_agent = user_agent.clone();
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = Duration::from_secs(timeout);
        }
        if let Some(attempts) = self.retry_attempts {
            settings.retry_attempts = attempts.max(1);
        }
        if let Some(base) = self.backoff_base {
            settings.backoff_base = base;
        }
        if let Some(ms) = self.min_request_interval_ms {
            settings.min_request_interval = Duration::from_millis(ms);
        }
        if let Some(pages) = self.max_pages {
            settings.max_pages = pages;
        }
        if let Some(failures) = self.max_consecutive_failures {
            settings.max_consecutive_failures = failures;
        }
        if let Some(policy) = self.on_page_error {
            settings.on_page_error = policy;
        }
        if let Some(key) = self.dedup_key {
            settings.dedup_key = key;
        }
        for (namespace, secs) in &self.cache_ttls {
            settings.cache_ttls = settings
                .cache_ttls
                .clone()
                .with_ttl(namespace, Duration::from_secs(*secs));
        }
        if let Some(ref primary) = self.primary {
            primary.apply(&mut settings.primary);
        }
        if let Some(ref secondary) = self.secondary {
            secondary.apply(&mut settings.secondary);
        }
    }
}

/// Where settings come from.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file (`--config`).
    pub config_path: Option<PathBuf>,
    /// Data directory override (`--data`).
    pub data: Option<PathBuf>,
}

/// Resolve settings: config file, then environment, then `--data`.
pub async fn load_settings_with_options(options: LoadOptions) -> Result<(Settings, Config), String> {
    let config = match options.config_path {
        Some(ref path) => Config::load_from_path(path).await?,
        None => Config::load().await,
    };

    let base_dir = config
        .base_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

    let mut settings = Settings::default();
    config.apply_to_settings(&mut settings, &base_dir);
    settings.apply_env()?;

    if let Some(data) = options.data {
        let expanded = shellexpand::tilde(&data.to_string_lossy()).into_owned();
        settings.set_data_dir(PathBuf::from(expanded));
    }

    tracing::debug!(
        "Using data dir {} (config: {:?})",
        settings.data_dir.display(),
        config.source_path
    );
    Ok((settings, config))
}
