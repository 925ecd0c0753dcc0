//! Extraction with primary/secondary fallback.
//!
//! The primary source is used when it answers its connectivity probe and
//! yields at least one normalized record. Otherwise the secondary is tried
//! the same way. When both fail the result is empty and the caller decides
//! what that means.

mod source;

pub use source::{ApiSource, DataSource, SourceConfig, SourceKind};

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::collector::StopReason;
use crate::transform::{adapt_all, NormalizedRecord, SourceTag};

/// What happened when one source was tried.
#[derive(Debug, Clone, Serialize)]
pub struct SourceAttempt {
    pub source: String,
    pub reachable: bool,
    pub raw_records: usize,
    pub normalized: usize,
    pub skipped: usize,
    pub failed_pages: Vec<u32>,
    pub stop_reason: Option<StopReason>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractionReport {
    /// Source whose records were returned.
    pub served_by: Option<String>,
    pub tag: Option<SourceTag>,
    pub attempts: Vec<SourceAttempt>,
}

impl ExtractionReport {
    pub fn used_fallback(&self) -> bool {
        self.attempts.len() > 1 && self.served_by.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct Extraction {
    pub records: Vec<NormalizedRecord>,
    pub report: ExtractionReport,
}

pub struct FallbackExtractor {
    primary: Arc<dyn DataSource>,
    secondary: Arc<dyn DataSource>,
}

impl FallbackExtractor {
    pub fn new(primary: Arc<dyn DataSource>, secondary: Arc<dyn DataSource>) -> Self {
        Self { primary, secondary }
    }

    /// Normalized records from the first source that produces any.
    pub async fn extract(&self, limit: Option<usize>) -> Extraction {
        let mut report = ExtractionReport::default();

        for source in [&self.primary, &self.secondary] {
            let (records, attempt) = Self::try_source(source.as_ref(), limit).await;
            report.attempts.push(attempt);
            if !records.is_empty() {
                info!(
                    "[{}] Extracted {} records",
                    source.name(),
                    records.len()
                );
                report.served_by = Some(source.name().to_string());
                report.tag = Some(source.tag());
                return Extraction { records, report };
            }
            warn!("[{}] Produced no records, trying next source", source.name());
        }

        error!("All sources failed, no data extracted");
        Extraction {
            records: Vec::new(),
            report,
        }
    }

    async fn try_source(
        source: &dyn DataSource,
        limit: Option<usize>,
    ) -> (Vec<NormalizedRecord>, SourceAttempt) {
        let mut attempt = SourceAttempt {
            source: source.name().to_string(),
            reachable: false,
            raw_records: 0,
            normalized: 0,
            skipped: 0,
            failed_pages: Vec::new(),
            stop_reason: None,
        };

        if !source.test_connectivity().await {
            warn!("[{}] Not reachable", source.name());
            return (Vec::new(), attempt);
        }
        attempt.reachable = true;

        let collection = source.fetch(limit).await;
        let batch = adapt_all(source.name(), &collection.records, Utc::now(), |raw, at| {
            source.adapt(raw, at)
        });

        attempt.raw_records = collection.records.len();
        attempt.normalized = batch.records.len();
        attempt.skipped = batch.skipped;
        attempt.failed_pages = collection.failed_pages;
        attempt.stop_reason = Some(collection.stop_reason);
        (batch.records, attempt)
    }
}
