//! Durable cache tier: one JSON file per fingerprint.
//!
//! Layout: `<root>/<namespace>/<sha256(fingerprint)>.json`. Files are written
//! to a temporary sibling and renamed into place, so a reader sees either the
//! old entry or the new one, never a partial write.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::entry::CacheEntry;
use super::key::CacheKey;

/// On-disk representation of an entry.
#[derive(Debug, Serialize, Deserialize)]
struct DiskRecord {
    namespace: String,
    #[serde(flatten)]
    entry: CacheEntry,
}

/// Summary of one file in the durable tier.
#[derive(Debug, Clone)]
pub(crate) struct DiskEntryInfo {
    pub namespace: String,
    pub entry: CacheEntry,
    pub size_bytes: u64,
}

#[derive(Debug, Clone)]
pub(crate) struct DiskTier {
    root: PathBuf,
}

/// Directory name for a namespace, restricted to a safe character set.
fn namespace_dir(namespace: &str) -> String {
    let cleaned: String = namespace
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

fn file_name(fingerprint: &str) -> String {
    let digest = Sha256::digest(fingerprint.as_bytes());
    format!("{}.json", hex::encode(digest))
}

impl DiskTier {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.root
            .join(namespace_dir(&key.namespace))
            .join(file_name(&key.fingerprint))
    }

    /// Read an entry, fresh or not. Any failure is reported as absence.
    pub async fn read(&self, key: &CacheKey) -> Option<CacheEntry> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!("Cache read error for {} ({}): {}", key, path.display(), e);
                return None;
            }
        };

        match serde_json::from_slice::<DiskRecord>(&bytes) {
            Ok(record) if record.entry.fingerprint == key.fingerprint => Some(record.entry),
            Ok(_) => {
                debug!("Cache file {} belongs to another fingerprint", path.display());
                None
            }
            Err(e) => {
                warn!("Corrupt cache file {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Atomically replace the entry for `key`.
    pub async fn write(&self, key: &CacheKey, entry: &CacheEntry) -> io::Result<()> {
        let path = self.path_for(key);
        let record = DiskRecord {
            namespace: key.namespace.clone(),
            entry: entry.clone(),
        };
        let bytes = serde_json::to_vec(&record).map_err(io::Error::other)?;

        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(io::Error::other)?
    }

    pub async fn remove(&self, key: &CacheKey) -> io::Result<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    /// Delete every cached file, keeping the root directory.
    ///
    /// Only files named like cache entries are removed. A directory that held
    /// some is removed afterwards if nothing else is left in it.
    pub async fn clear(&self) -> io::Result<()> {
        let mut namespaces = match tokio::fs::read_dir(&self.root).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        while let Some(dir) = namespaces.next_entry().await? {
            if !dir.file_type().await?.is_dir() {
                continue;
            }
            let mut files = tokio::fs::read_dir(dir.path()).await?;
            let mut removed = 0usize;
            while let Some(file) = files.next_entry().await? {
                if is_cache_file(&file.path()) {
                    tokio::fs::remove_file(file.path()).await?;
                    removed += 1;
                }
            }
            if removed == 0 {
                continue;
            }
            if let Err(e) = tokio::fs::remove_dir(dir.path()).await {
                debug!("Keeping {}: {}", dir.path().display(), e);
            }
        }
        Ok(())
    }

    /// Scan every entry in the tier. Unreadable files are skipped.
    pub async fn scan(&self) -> Vec<DiskEntryInfo> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || scan_blocking(&root))
            .await
            .unwrap_or_default()
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = path
        .parent()
        .ok_or_else(|| io::Error::other("cache path has no parent"))?;
    std::fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// `<64 hex digits>.json`, as produced by [`file_name`].
fn is_cache_file(path: &Path) -> bool {
    if path.extension().and_then(|e| e.to_str()) != Some("json") {
        return false;
    }
    path.file_stem()
        .and_then(|s| s.to_str())
        .is_some_and(|stem| stem.len() == 64 && stem.bytes().all(|b| b.is_ascii_hexdigit()))
}

fn scan_blocking(root: &Path) -> Vec<DiskEntryInfo> {
    let mut found = Vec::new();
    let Ok(namespaces) = std::fs::read_dir(root) else {
        return found;
    };

    for ns_dir in namespaces.flatten() {
        let Ok(files) = std::fs::read_dir(ns_dir.path()) else {
            continue;
        };
        for file in files.flatten() {
            let path = file.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Ok(bytes) = std::fs::read(&path) else {
                continue;
            };
            match serde_json::from_slice::<DiskRecord>(&bytes) {
                Ok(record) => found.push(DiskEntryInfo {
                    namespace: record.namespace,
                    entry: record.entry,
                    size_bytes: bytes.len() as u64,
                }),
                Err(e) => debug!("Skipping unreadable cache file {}: {}", path.display(), e),
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use tempfile::tempdir;

    fn key(fp: &str) -> CacheKey {
        CacheKey::new("search", fp)
    }

    #[test]
    fn test_namespace_dir_is_filesystem_safe() {
        assert_eq!(namespace_dir("geographic_data"), "geographic_data");
        assert_eq!(namespace_dir("../etc"), "___etc");
        assert_eq!(namespace_dir(""), "_");
    }

    #[tokio::test]
    async fn test_write_then_read() {
        let dir = tempdir().unwrap();
        let tier = DiskTier::new(dir.path().to_path_buf());
        let entry = CacheEntry::new("/search?query=stone".into(), json!([1, 2]), Utc::now());

        tier.write(&key("/search?query=stone"), &entry).await.unwrap();
        let loaded = tier.read(&key("/search?query=stone")).await.unwrap();

        assert_eq!(loaded, entry);
    }

    #[tokio::test]
    async fn test_overwrite_replaces_entry() {
        let dir = tempdir().unwrap();
        let tier = DiskTier::new(dir.path().to_path_buf());
        let k = key("/meta");

        tier.write(&k, &CacheEntry::new("/meta".into(), json!(1), Utc::now()))
            .await
            .unwrap();
        tier.write(&k, &CacheEntry::new("/meta".into(), json!(2), Utc::now()))
            .await
            .unwrap();

        assert_eq!(tier.read(&k).await.unwrap().payload, json!(2));
        // No temp files left behind
        let files: Vec<_> = std::fs::read_dir(dir.path().join("search"))
            .unwrap()
            .collect();
        assert_eq!(files.len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_file_reads_as_missing() {
        let dir = tempdir().unwrap();
        let tier = DiskTier::new(dir.path().to_path_buf());
        let k = key("/meta");
        let path = tier.path_for(&k);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"{ not json").unwrap();

        assert!(tier.read(&k).await.is_none());
    }

    #[tokio::test]
    async fn test_remove_and_clear() {
        let dir = tempdir().unwrap();
        let tier = DiskTier::new(dir.path().to_path_buf());
        for fp in ["/a", "/b", "/c"] {
            tier.write(&key(fp), &CacheEntry::new(fp.into(), json!(fp), Utc::now()))
                .await
                .unwrap();
        }

        tier.remove(&key("/a")).await.unwrap();
        tier.remove(&key("/missing")).await.unwrap();
        assert!(tier.read(&key("/a")).await.is_none());
        assert_eq!(tier.scan().await.len(), 2);

        tier.clear().await.unwrap();
        assert!(tier.scan().await.is_empty());
        assert!(dir.path().exists());
    }

    #[tokio::test]
    async fn test_clear_leaves_foreign_files_alone() {
        let dir = tempdir().unwrap();
        let tier = DiskTier::new(dir.path().to_path_buf());
        let foreign = dir.path().join("handoff");
        std::fs::create_dir_all(&foreign).unwrap();
        std::fs::write(foreign.join("extract.json.bak"), b"[]").unwrap();
        std::fs::write(foreign.join("extract.json"), b"[]").unwrap();
        let k = key("/meta");
        tier.write(&k, &CacheEntry::new("/meta".into(), json!(1), Utc::now()))
            .await
            .unwrap();
        std::fs::create_dir_all(dir.path().join("empty")).unwrap();
        // Unrelated file sitting next to cache entries
        std::fs::write(dir.path().join("search").join("notes.txt"), b"keep").unwrap();

        tier.clear().await.unwrap();

        assert!(tier.read(&k).await.is_none());
        assert!(foreign.join("extract.json.bak").exists());
        assert!(foreign.join("extract.json").exists());
        assert!(dir.path().join("search").join("notes.txt").exists());
        assert!(dir.path().join("empty").exists());
    }

    #[tokio::test]
    async fn test_clear_removes_emptied_namespace_dirs() {
        let dir = tempdir().unwrap();
        let tier = DiskTier::new(dir.path().to_path_buf());
        let k = key("/meta");
        tier.write(&k, &CacheEntry::new("/meta".into(), json!(1), Utc::now()))
            .await
            .unwrap();

        tier.clear().await.unwrap();

        assert!(!dir.path().join("search").exists());
        assert!(dir.path().exists());
    }

    #[test]
    fn test_is_cache_file() {
        assert!(is_cache_file(Path::new(&file_name("/meta"))));
        assert!(!is_cache_file(Path::new("extract.json")));
        assert!(!is_cache_file(Path::new("extract.json.bak")));
    }
}
