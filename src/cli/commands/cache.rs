//! Response cache commands.

use super::super::helpers::{print_json, success};
use crate::cache::{CacheKey, ResponseCache};
use crate::config::Settings;

fn open_cache(settings: &Settings) -> ResponseCache {
    ResponseCache::new(settings.cache_dir.clone(), settings.cache_ttls.clone())
}

pub async fn cmd_cache_stats(settings: Settings) -> anyhow::Result<()> {
    print_json(&open_cache(&settings).stats().await)
}

pub async fn cmd_cache_clear(settings: Settings) -> anyhow::Result<()> {
    open_cache(&settings).clear().await;
    success(format!("Cleared cache at {}", settings.cache_dir.display()));
    Ok(())
}

pub async fn cmd_cache_invalidate(
    settings: Settings,
    namespace: &str,
    url: &str,
    params: &[(String, String)],
) -> anyhow::Result<()> {
    let key = CacheKey::for_request(namespace, url, params.iter().map(|(k, v)| (k, v)));
    open_cache(&settings).invalidate(&key).await;
    success(format!("Invalidated {}", key));
    Ok(())
}
