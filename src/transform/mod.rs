//! Normalization of upstream payloads into [`NormalizedRecord`]s.
//!
//! Adapters are pure: they take one raw JSON object and a processing
//! timestamp and either produce a record or explain why they could not.

mod brewery;
pub mod categorize;
pub mod coerce;
mod punk;
mod record;

pub use brewery::adapt_brewery;
pub use punk::adapt_beer;
pub use record::{
    BreweryInfo, Category, Hop, Ingredients, Malt, MashStep, Measure, Method, NormalizedRecord,
    SourceTag,
};

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

#[derive(Debug, Clone, thiserror::Error)]
pub enum AdaptError {
    #[error("record is not a JSON object")]
    NotAnObject,
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
}

/// Records produced from a raw batch, plus how many were dropped.
#[derive(Debug, Clone, Default)]
pub struct AdaptedBatch {
    pub records: Vec<NormalizedRecord>,
    pub skipped: usize,
}

/// Apply `adapt` to every raw record, skipping (and logging) the ones it
/// rejects.
pub fn adapt_all<F>(source: &str, raw: &[Value], processed_at: DateTime<Utc>, adapt: F) -> AdaptedBatch
where
    F: Fn(&Value, DateTime<Utc>) -> Result<NormalizedRecord, AdaptError>,
{
    let mut batch = AdaptedBatch::default();
    for (i, item) in raw.iter().enumerate() {
        match adapt(item, processed_at) {
            Ok(record) => batch.records.push(record),
            Err(e) => {
                let id = item.get("id").map(|v| v.to_string());
                warn!(
                    "[{}] Skipping record {} ({}): {}",
                    source,
                    i,
                    id.as_deref().unwrap_or("unknown"),
                    e
                );
                batch.skipped += 1;
            }
        }
    }
    info!(
        "[{}] Normalized {} out of {} records",
        source,
        batch.records.len(),
        raw.len()
    );
    batch
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub total_records: usize,
    pub valid_records: usize,
    pub invalid_records: usize,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.invalid_records == 0
    }
}

/// Problems that keep one record out of the warehouse; empty when it is loadable.
pub fn record_problems(record: &NormalizedRecord) -> Vec<String> {
    let mut problems = Vec::new();
    if record.beer_id.trim().is_empty() {
        problems.push("missing required field 'beer_id'".to_string());
    }
    if record.name.trim().is_empty() {
        problems.push("missing required field 'name'".to_string());
    }
    if let Some(abv) = record.abv {
        if !abv.is_finite() || abv < 0.0 {
            problems.push(format!("invalid ABV {}", abv));
        }
    }
    problems
}

/// Check required fields and numeric sanity of a batch.
pub fn validate(records: &[NormalizedRecord]) -> ValidationReport {
    let mut report = ValidationReport {
        total_records: records.len(),
        ..Default::default()
    };

    for (i, record) in records.iter().enumerate() {
        let problems = record_problems(record);
        if problems.is_empty() {
            report.valid_records += 1;
        } else {
            report.invalid_records += 1;
            report
                .errors
                .extend(problems.into_iter().map(|p| format!("Record {}: {}", i, p)));
        }
    }
    report
}

/// Record count per category.
pub fn category_summary(records: &[NormalizedRecord]) -> BTreeMap<Category, usize> {
    let mut counts = BTreeMap::new();
    for record in records {
        *counts.entry(record.category).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_adapt_all_skips_malformed() {
        let raw = vec![
            json!({"id": 1, "name": "Good"}),
            json!({"name": "No id"}),
            json!(42),
            json!({"id": 2, "name": "Also good"}),
        ];
        let batch = adapt_all("punk", &raw, Utc::now(), adapt_beer);

        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.skipped, 2);
        assert_eq!(batch.records[1].beer_id, "2");
    }

    #[test]
    fn test_validate() {
        let now = Utc::now();
        let good = NormalizedRecord::new("1", "Good", SourceTag::PunkApi, now);
        let mut nameless = NormalizedRecord::new("2", " ", SourceTag::PunkApi, now);
        nameless.abv = Some(-1.0);

        let report = validate(&[good, nameless]);
        assert_eq!(report.total_records, 2);
        assert_eq!(report.valid_records, 1);
        assert_eq!(report.invalid_records, 1);
        assert_eq!(report.errors.len(), 2);
        assert!(!report.is_valid());
    }

    #[test]
    fn test_category_summary() {
        let now = Utc::now();
        let mut a = NormalizedRecord::new("1", "A", SourceTag::PunkApi, now);
        a.category = Category::Ale;
        let b = NormalizedRecord::new("2", "B", SourceTag::PunkApi, now);
        let mut c = NormalizedRecord::new("3", "C", SourceTag::PunkApi, now);
        c.category = Category::Ale;

        let summary = category_summary(&[a, b, c]);
        assert_eq!(summary[&Category::Ale], 2);
        assert_eq!(summary[&Category::Other], 1);
        assert!(!summary.contains_key(&Category::Lager));
    }
}
