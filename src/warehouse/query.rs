//! Parameterized aggregation requests against the warehouse.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::transform::Category;

/// Column to group an aggregation by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    #[default]
    Category,
    Subcategory,
    Source,
}

impl GroupBy {
    pub(crate) fn column(&self) -> &'static str {
        match self {
            GroupBy::Category => "category",
            GroupBy::Subcategory => "subcategory",
            GroupBy::Source => "data_source",
        }
    }
}

impl FromStr for GroupBy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "category" => Ok(GroupBy::Category),
            "subcategory" => Ok(GroupBy::Subcategory),
            "source" => Ok(GroupBy::Source),
            other => Err(format!("cannot group by '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregateQuery {
    pub group_by: GroupBy,
    /// Only rows in this category.
    #[serde(default)]
    pub category: Option<Category>,
    /// Largest groups first, at most this many.
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateRow {
    pub key: Option<String>,
    pub count: u64,
    pub avg_abv: Option<f64>,
    pub avg_ibu: Option<f64>,
    pub min_abv: Option<f64>,
    pub max_abv: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WarehouseSummary {
    pub total_records: u64,
    pub distinct_categories: u64,
    pub avg_abv: Option<f64>,
    pub avg_ibu: Option<f64>,
    pub by_source: BTreeMap<String, u64>,
}

/// A key appearing more than once.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateGroup {
    pub beer_id: String,
    pub name: Option<String>,
    pub copies: u64,
}
