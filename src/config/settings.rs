//! Resolved runtime settings.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::cache::TtlPolicy;
use crate::collector::{CollectorOptions, PageErrorPolicy, DEFAULT_MAX_PAGES};
use crate::dedup::DedupKeyStrategy;
use crate::extract::SourceConfig;
use crate::http_client::USER_AGENT;

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "warehouse.db";

/// Default cache subdirectory name.
const CACHE_SUBDIR: &str = "cache";

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Durable cache tier root.
    pub cache_dir: PathBuf,
    /// SQLite warehouse file.
    pub database_path: PathBuf,
    pub user_agent: String,
    /// Timeout for each network attempt.
    pub request_timeout: Duration,
    /// Attempts per request, the first included.
    pub retry_attempts: u32,
    /// Backoff is `backoff_base^attempt` seconds.
    pub backoff_base: f64,
    /// Minimum spacing between requests to one host.
    pub min_request_interval: Duration,
    pub max_pages: u32,
    pub max_consecutive_failures: u32,
    pub on_page_error: PageErrorPolicy,
    pub dedup_key: DedupKeyStrategy,
    pub cache_ttls: TtlPolicy,
    pub primary: SourceConfig,
    pub secondary: SourceConfig,
}

impl Default for Settings {
    fn default() -> Self {
        // <data_local_dir>/brewpipe, falling back to the home directory, then CWD
        let data_dir = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("brewpipe");

        Self {
            cache_dir: data_dir.join(CACHE_SUBDIR),
            database_path: data_dir.join(DEFAULT_DATABASE_FILENAME),
            data_dir,
            user_agent: USER_AGENT.to_string(),
            request_timeout: Duration::from_secs(30),
            retry_attempts: 3,
            backoff_base: 2.0,
            min_request_interval: Duration::from_millis(100),
            max_pages: DEFAULT_MAX_PAGES,
            max_consecutive_failures: 3,
            on_page_error: PageErrorPolicy::Skip,
            dedup_key: DedupKeyStrategy::IdentityAndName,
            cache_ttls: TtlPolicy::default(),
            primary: SourceConfig::punk(),
            secondary: SourceConfig::open_brewery(),
        }
    }
}

impl Settings {
    /// Settings rooted at `data_dir`, otherwise default.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        let mut settings = Self::default();
        settings.set_data_dir(data_dir);
        settings
    }

    /// Move the data directory, along with the cache and database under it.
    pub fn set_data_dir(&mut self, data_dir: PathBuf) {
        self.cache_dir = data_dir.join(CACHE_SUBDIR);
        self.database_path = data_dir.join(DEFAULT_DATABASE_FILENAME);
        self.data_dir = data_dir;
    }

    /// Collector options derived from these settings.
    pub fn collector_options(&self) -> CollectorOptions {
        CollectorOptions {
            max_pages: self.max_pages,
            on_page_error: self.on_page_error,
            max_consecutive_failures: self.max_consecutive_failures,
            ..Default::default()
        }
    }

    /// Apply `BREWPIPE_*` overrides read through `lookup`.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), String>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = get("BREWPIPE_DATA_DIR") {
            let expanded = shellexpand::tilde(&dir).into_owned();
            self.set_data_dir(PathBuf::from(expanded));
        }
        if let Some(url) = get("BREWPIPE_PRIMARY_URL") {
            self.primary.base_url = url;
        }
        if let Some(url) = get("BREWPIPE_SECONDARY_URL") {
            self.secondary.base_url = url;
        }
        if let Some(secs) = get("BREWPIPE_REQUEST_TIMEOUT") {
            let secs: u64 = secs
                .trim()
                .parse()
                .map_err(|_| format!("BREWPIPE_REQUEST_TIMEOUT must be seconds, got '{}'", secs))?;
            self.request_timeout = Duration::from_secs(secs);
        }
        if let Some(attempts) = get("BREWPIPE_RETRY_ATTEMPTS") {
            self.retry_attempts = attempts.trim().parse().map_err(|_| {
                format!("BREWPIPE_RETRY_ATTEMPTS must be a number, got '{}'", attempts)
            })?;
        }
        if let Some(ms) = get("BREWPIPE_MIN_INTERVAL_MS") {
            let ms: u64 = ms.trim().parse().map_err(|_| {
                format!("BREWPIPE_MIN_INTERVAL_MS must be milliseconds, got '{}'", ms)
            })?;
            self.min_request_interval = Duration::from_millis(ms);
        }
        Ok(())
    }

    /// Apply `BREWPIPE_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<(), String> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Printable view for `config show`.
    pub fn view(&self) -> SettingsView {
        SettingsView {
            data_dir: self.data_dir.display().to_string(),
            cache_dir: self.cache_dir.display().to_string(),
            database_path: self.database_path.display().to_string(),
            user_agent: self.user_agent.clone(),
            request_timeout_secs: self.request_timeout.as_secs(),
            retry_attempts: self.retry_attempts,
            backoff_base: self.backoff_base,
            min_request_interval_ms: self.min_request_interval.as_millis() as u64,
            max_pages: self.max_pages,
            max_consecutive_failures: self.max_consecutive_failures,
            on_page_error: self.on_page_error,
            dedup_key: self.dedup_key,
            cache_ttls: self.cache_ttls.as_seconds(),
            primary: self.primary.clone(),
            secondary: self.secondary.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SettingsView {
    pub data_dir: String,
    pub cache_dir: String,
    pub database_path: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub retry_attempts: u32,
    pub backoff_base: f64,
    pub min_request_interval_ms: u64,
    pub max_pages: u32,
    pub max_consecutive_failures: u32,
    pub on_page_error: PageErrorPolicy,
    pub dedup_key: DedupKeyStrategy,
    pub cache_ttls: std::collections::BTreeMap<String, u64>,
    pub primary: SourceConfig,
    pub secondary: SourceConfig,
}
