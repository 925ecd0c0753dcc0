//! SQLite warehouse for normalized records.
//!
//! The `beers` table carries no uniqueness constraint: append loads may add
//! a second copy of a record, and [`Warehouse::deduplicate`] collapses them
//! afterwards with the same rule as the in-memory pass.

mod query;

pub use query::{AggregateQuery, AggregateRow, DuplicateGroup, GroupBy, WarehouseSummary};

use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::SecondsFormat;
use rusqlite::{params, params_from_iter, Connection};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::dedup::DedupKeyStrategy;
use crate::transform::NormalizedRecord;

#[derive(Debug, thiserror::Error)]
pub enum WarehouseError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, WarehouseError>;

/// How a load treats rows already in the table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Replace the table contents with the batch.
    #[default]
    ReplaceAll,
    /// Add the batch after the existing rows.
    Append,
}

impl FromStr for WriteMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "replace_all" | "replace" => Ok(WriteMode::ReplaceAll),
            "append" => Ok(WriteMode::Append),
            other => Err(format!("unknown write mode '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub mode: WriteMode,
    pub written: u64,
    pub total_rows: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DedupReport {
    pub before: u64,
    pub after: u64,
    pub removed: u64,
}

const COLUMNS: &str = "beer_id, name, tagline, description, first_brewed, abv, ibu, \
                       category, subcategory, category_confidence, data_source, processed_at, \
                       city, state, country, payload";

/// File-backed SQLite sink.
#[derive(Debug, Clone)]
pub struct Warehouse {
    db_path: PathBuf,
}

impl Warehouse {
    /// Open (and create if needed) the warehouse at `db_path`.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let warehouse = Self {
            db_path: db_path.to_path_buf(),
        };
        warehouse.init_schema()?;
        Ok(warehouse)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        Ok(conn)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.connect()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS beers (
                beer_id TEXT NOT NULL,
                name TEXT NOT NULL,
                tagline TEXT,
                description TEXT,
                first_brewed TEXT,
                abv REAL,
                ibu REAL,
                category TEXT NOT NULL,
                subcategory TEXT,
                category_confidence REAL,
                data_source TEXT NOT NULL,
                processed_at TEXT NOT NULL,
                city TEXT,
                state TEXT,
                country TEXT,
                payload TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_beers_identity
                ON beers(beer_id, name);
            CREATE INDEX IF NOT EXISTS idx_beers_category
                ON beers(category, subcategory);
        "#,
        )?;
        Ok(())
    }

    /// Write a batch in one transaction.
    pub fn load(&self, records: &[NormalizedRecord], mode: WriteMode) -> Result<LoadReport> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        if mode == WriteMode::ReplaceAll {
            let removed = tx.execute("DELETE FROM beers", [])?;
            debug!("Cleared {} existing rows", removed);
        }

        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO beers ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
                COLUMNS
            ))?;
            for record in records {
                let info = record.brewery_info.as_ref();
                stmt.execute(params![
                    record.beer_id,
                    record.name,
                    record.tagline,
                    record.description,
                    record.first_brewed,
                    record.abv,
                    record.ibu,
                    record.category.as_str(),
                    record.subcategory,
                    record.category_confidence,
                    record.data_source.as_str(),
                    record
                        .processed_at
                        .to_rfc3339_opts(SecondsFormat::Micros, true),
                    info.and_then(|i| i.city.clone()),
                    info.and_then(|i| i.state.clone()),
                    info.and_then(|i| i.country.clone()),
                    serde_json::to_string(record)?,
                ])?;
            }
        }

        let total: i64 = tx.query_row("SELECT COUNT(*) FROM beers", [], |row| row.get(0))?;
        tx.commit()?;

        info!(
            "Loaded {} records ({:?}), warehouse holds {}",
            records.len(),
            mode,
            total
        );
        Ok(LoadReport {
            mode,
            written: records.len() as u64,
            total_rows: total as u64,
        })
    }

    pub fn count(&self) -> Result<u64> {
        let conn = self.connect()?;
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM beers", [], |row| row.get(0))?;
        Ok(total as u64)
    }

    /// Every stored record in insertion order. Unreadable rows are skipped.
    pub fn records(&self) -> Result<Vec<NormalizedRecord>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare("SELECT payload FROM beers ORDER BY rowid")?;
        let payloads = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(payloads
            .iter()
            .filter_map(|p| match serde_json::from_str(p) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Skipping unreadable warehouse row: {}", e);
                    None
                }
            })
            .collect())
    }

    /// Keys stored more than once, most copies first.
    pub fn duplicate_groups(&self, strategy: DedupKeyStrategy) -> Result<Vec<DuplicateGroup>> {
        let key = strategy.columns().join(", ");
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {key}, COUNT(*) AS copies FROM beers \
             GROUP BY {key} HAVING COUNT(*) > 1 \
             ORDER BY copies DESC, beer_id"
        ))?;

        let with_name = strategy == DedupKeyStrategy::IdentityAndName;
        let groups = stmt
            .query_map([], |row| {
                Ok(DuplicateGroup {
                    beer_id: row.get("beer_id")?,
                    name: if with_name { row.get("name")? } else { None },
                    copies: row.get::<_, i64>("copies")? as u64,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(groups)
    }

    /// Keep one row per key: the latest `processed_at`, earliest row on ties.
    ///
    /// Survivors are staged in a scratch table and swapped back in within a
    /// single transaction, preserving the first-seen order of each key.
    pub fn deduplicate(&self, strategy: DedupKeyStrategy) -> Result<DedupReport> {
        let key = strategy.columns().join(", ");
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;

        let before: i64 = tx.query_row("SELECT COUNT(*) FROM beers", [], |row| row.get(0))?;

        tx.execute_batch(&format!(
            r#"
            DROP TABLE IF EXISTS beers_dedup;
            CREATE TEMP TABLE beers_dedup AS
            SELECT {COLUMNS}, first_seen FROM (
                SELECT {COLUMNS},
                    ROW_NUMBER() OVER (
                        PARTITION BY {key}
                        ORDER BY processed_at DESC, rowid ASC
                    ) AS row_num,
                    MIN(rowid) OVER (PARTITION BY {key}) AS first_seen
                FROM beers
            )
            WHERE row_num = 1;

            DELETE FROM beers;
            INSERT INTO beers ({COLUMNS})
                SELECT {COLUMNS} FROM beers_dedup ORDER BY first_seen;
            DROP TABLE beers_dedup;
        "#
        ))?;

        let after: i64 = tx.query_row("SELECT COUNT(*) FROM beers", [], |row| row.get(0))?;
        tx.commit()?;

        let report = DedupReport {
            before: before as u64,
            after: after as u64,
            removed: (before - after) as u64,
        };
        info!(
            "Deduplicated warehouse: {} -> {} rows ({} removed)",
            report.before, report.after, report.removed
        );
        Ok(report)
    }

    pub fn aggregate(&self, query: &AggregateQuery) -> Result<Vec<AggregateRow>> {
        let column = query.group_by.column();
        let mut sql = format!(
            "SELECT {column} AS group_key, COUNT(*) AS n, AVG(abv), AVG(ibu), MIN(abv), MAX(abv) \
             FROM beers"
        );
        let mut args: Vec<String> = Vec::new();
        if let Some(category) = query.category {
            sql.push_str(" WHERE category = ?1");
            args.push(category.as_str().to_string());
        }
        sql.push_str(&format!(" GROUP BY {column} ORDER BY n DESC, group_key"));
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let conn = self.connect()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), |row| {
                Ok(AggregateRow {
                    key: row.get(0)?,
                    count: row.get::<_, i64>(1)? as u64,
                    avg_abv: row.get(2)?,
                    avg_ibu: row.get(3)?,
                    min_abv: row.get(4)?,
                    max_abv: row.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn summary(&self) -> Result<WarehouseSummary> {
        let conn = self.connect()?;
        let (total, categories, avg_abv, avg_ibu) = conn.query_row(
            "SELECT COUNT(*), COUNT(DISTINCT category), AVG(abv), AVG(ibu) FROM beers",
            [],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, Option<f64>>(2)?,
                    row.get::<_, Option<f64>>(3)?,
                ))
            },
        )?;

        let mut stmt =
            conn.prepare("SELECT data_source, COUNT(*) FROM beers GROUP BY data_source")?;
        let by_source = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
            })?
            .collect::<std::result::Result<_, _>>()?;

        Ok(WarehouseSummary {
            total_records: total as u64,
            distinct_categories: categories as u64,
            avg_abv,
            avg_ibu,
            by_source,
        })
    }
}
