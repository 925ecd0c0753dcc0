//! Collapsing duplicate logical records.
//!
//! Records sharing a [`DedupKey`] are the same entity; the copy with the
//! latest `processed_at` survives (first seen wins ties). Survivors come out
//! in the order their key was first seen, which makes the pass idempotent.

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::transform::NormalizedRecord;

/// Which fields identify a logical record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupKeyStrategy {
    /// `(beer_id, name)`.
    #[default]
    IdentityAndName,
    /// `beer_id` alone. Safer when names are edited upstream.
    Identity,
}

impl DedupKeyStrategy {
    pub fn key(&self, record: &NormalizedRecord) -> DedupKey {
        match self {
            DedupKeyStrategy::IdentityAndName => DedupKey {
                identity: record.beer_id.clone(),
                name: Some(record.name.clone()),
            },
            DedupKeyStrategy::Identity => DedupKey {
                identity: record.beer_id.clone(),
                name: None,
            },
        }
    }

    /// Warehouse columns making up the key.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            DedupKeyStrategy::IdentityAndName => &["beer_id", "name"],
            DedupKeyStrategy::Identity => &["beer_id"],
        }
    }
}

impl FromStr for DedupKeyStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "identity_and_name" => Ok(Self::IdentityAndName),
            "identity" => Ok(Self::Identity),
            other => Err(format!("unknown dedup key '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    pub identity: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Deduplicator {
    strategy: DedupKeyStrategy,
}

impl Deduplicator {
    pub fn new(strategy: DedupKeyStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> DedupKeyStrategy {
        self.strategy
    }

    /// One record per key, latest `processed_at` first, keys in first-seen order.
    pub fn deduplicate(&self, records: Vec<NormalizedRecord>) -> Vec<NormalizedRecord> {
        let input_len = records.len();
        let mut slots: HashMap<DedupKey, usize> = HashMap::with_capacity(input_len);
        let mut survivors: Vec<NormalizedRecord> = Vec::with_capacity(input_len);

        for record in records {
            let key = self.strategy.key(&record);
            match slots.get(&key) {
                Some(&slot) => {
                    if record.processed_at > survivors[slot].processed_at {
                        survivors[slot] = record;
                    }
                }
                None => {
                    slots.insert(key, survivors.len());
                    survivors.push(record);
                }
            }
        }

        debug!(
            "Deduplicated {} records into {}",
            input_len,
            survivors.len()
        );
        survivors
    }
}
