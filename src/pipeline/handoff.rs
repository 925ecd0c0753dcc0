//! Handoff artifacts between stages run as separate processes.
//!
//! An artifact is a JSON array of normalized records. Writes go to a
//! temporary file in the destination directory and are renamed into place,
//! so a reader never sees a partial array.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

use crate::transform::NormalizedRecord;

#[derive(Debug, thiserror::Error)]
pub enum HandoffError {
    #[error("handoff I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("handoff at {path} is not a record array: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Write `records` to `path` atomically.
pub fn write_records(path: &Path, records: &[NormalizedRecord]) -> Result<(), HandoffError> {
    let io_err = |source| HandoffError::Io {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir).map_err(io_err)?;

    let body = serde_json::to_vec_pretty(records).map_err(|source| HandoffError::Json {
        path: path.to_path_buf(),
        source,
    })?;

    let mut tmp = NamedTempFile::new_in(&dir).map_err(io_err)?;
    tmp.write_all(&body).map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;

    debug!("Wrote {} records to {}", records.len(), path.display());
    Ok(())
}

/// Read an artifact written by [`write_records`].
pub fn read_records(path: &Path) -> Result<Vec<NormalizedRecord>, HandoffError> {
    let body = std::fs::read(path).map_err(|source| HandoffError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_slice(&body).map_err(|source| HandoffError::Json {
        path: path.to_path_buf(),
        source,
    })
}
