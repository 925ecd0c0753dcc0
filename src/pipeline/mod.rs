//! Extract → transform → load orchestration.
//!
//! Each stage can run on its own (the CLI exposes them separately and hands
//! records between processes through [`handoff`] artifacts) or all together
//! through [`Pipeline::run`], which finishes with a persisted deduplication
//! pass over the warehouse.

pub mod handoff;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

use crate::dedup::{DedupKeyStrategy, Deduplicator};
use crate::extract::{Extraction, ExtractionReport, FallbackExtractor};
use crate::transform::{category_summary, record_problems, validate, Category, NormalizedRecord, ValidationReport};
use crate::warehouse::{DedupReport, LoadReport, Warehouse, WarehouseError, WriteMode};

pub use handoff::HandoffError;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),
    #[error(transparent)]
    Handoff(#[from] HandoffError),
    #[error("warehouse task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Output of the transform stage.
#[derive(Debug, Clone)]
pub struct Transformed {
    pub records: Vec<NormalizedRecord>,
    pub validation: ValidationReport,
    /// Records collapsed by in-batch deduplication.
    pub duplicates_dropped: usize,
    pub categories: BTreeMap<Category, usize>,
}

/// Summary of a full run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub extraction: ExtractionReport,
    pub extracted: usize,
    pub validation: ValidationReport,
    pub duplicates_dropped: usize,
    pub categories: BTreeMap<Category, usize>,
    /// `None` when nothing was extracted and loading was skipped.
    pub load: Option<LoadReport>,
    pub dedup: Option<DedupReport>,
    pub elapsed_ms: u128,
}

impl PipelineReport {
    /// True when both sources came up empty.
    pub fn is_empty(&self) -> bool {
        self.extracted == 0
    }
}

pub struct Pipeline {
    extractor: Arc<FallbackExtractor>,
    warehouse: Warehouse,
    dedup_key: DedupKeyStrategy,
}

impl Pipeline {
    pub fn new(
        extractor: Arc<FallbackExtractor>,
        warehouse: Warehouse,
        dedup_key: DedupKeyStrategy,
    ) -> Self {
        Self {
            extractor,
            warehouse,
            dedup_key,
        }
    }

    pub fn warehouse(&self) -> &Warehouse {
        &self.warehouse
    }

    /// Pull normalized records, optionally writing them to a handoff file.
    pub async fn extract(&self, limit: Option<usize>, handoff: Option<&Path>) -> Result<Extraction> {
        let extraction = self.extractor.extract(limit).await;
        if let Some(path) = handoff {
            handoff::write_records(path, &extraction.records)?;
            info!(
                "Wrote {} extracted records to {}",
                extraction.records.len(),
                path.display()
            );
        }
        Ok(extraction)
    }

    /// Validate, drop invalid records and collapse in-batch duplicates.
    pub fn transform(&self, records: Vec<NormalizedRecord>) -> Transformed {
        let validation = validate(&records);
        for error in validation.errors.iter().take(10) {
            warn!("Validation: {}", error);
        }

        let valid: Vec<_> = records
            .into_iter()
            .filter(|r| record_problems(r).is_empty())
            .collect();
        let before = valid.len();
        let records = Deduplicator::new(self.dedup_key).deduplicate(valid);
        let categories = category_summary(&records);

        info!(
            "Transformed {} records ({} invalid, {} duplicates)",
            records.len(),
            validation.invalid_records,
            before - records.len()
        );

        Transformed {
            duplicates_dropped: before - records.len(),
            records,
            validation,
            categories,
        }
    }

    /// Write records to the warehouse.
    pub async fn load(&self, records: Vec<NormalizedRecord>, mode: WriteMode) -> Result<LoadReport> {
        let warehouse = self.warehouse.clone();
        let report = tokio::task::spawn_blocking(move || warehouse.load(&records, mode)).await??;
        Ok(report)
    }

    /// Collapse duplicate rows already stored in the warehouse.
    pub async fn dedupe(&self) -> Result<DedupReport> {
        let warehouse = self.warehouse.clone();
        let strategy = self.dedup_key;
        let report = tokio::task::spawn_blocking(move || warehouse.deduplicate(strategy)).await??;
        Ok(report)
    }

    /// Run every stage.
    ///
    /// An empty extraction leaves the warehouse untouched, so a
    /// `ReplaceAll` run during an outage never wipes the last good load.
    pub async fn run(&self, limit: Option<usize>, mode: WriteMode) -> Result<PipelineReport> {
        let started = Instant::now();
        let extraction = self.extract(limit, None).await?;
        let extracted = extraction.records.len();
        let transformed = self.transform(extraction.records);

        let (load, dedup) = if transformed.records.is_empty() {
            warn!("Nothing to load, warehouse left unchanged");
            (None, None)
        } else {
            let load = self.load(transformed.records, mode).await?;
            let dedup = self.dedupe().await?;
            (Some(load), Some(dedup))
        };

        let report = PipelineReport {
            extraction: extraction.report,
            extracted,
            validation: transformed.validation,
            duplicates_dropped: transformed.duplicates_dropped,
            categories: transformed.categories,
            load,
            dedup,
            elapsed_ms: started.elapsed().as_millis(),
        };
        info!(
            "Pipeline finished in {}ms: {} extracted, {} loaded",
            report.elapsed_ms,
            report.extracted,
            report.load.as_ref().map(|l| l.written).unwrap_or(0)
        );
        Ok(report)
    }
}
