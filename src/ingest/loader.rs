//! Deduplicating bulk loader
//!
//! A batch is reduced to the rows whose natural key is not yet stored, then
//! transferred in one bulk operation inside a single transaction. Rows that
//! share a key within the batch collapse to one according to the configured
//! [`DuplicatePolicy`].

use std::collections::HashSet;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::batch::{Batch, Direction};
use super::error::{IngestError, IngestResult};
use super::schema::{ColumnPlan, NaturalKey, coerce_batch};
use crate::database::config::DuplicatePolicy;
use crate::database::sql::{Ident, idents};
use crate::database::{CellValue, DatabaseBackend, TableSchema, rollback_quietly};

/// How a batch is applied to its table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadMode {
    /// Insert only rows whose natural key is not yet stored
    #[default]
    Incremental,
    /// Clear the table, then insert the whole batch
    Replace,
}

impl std::str::FromStr for LoadMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "incremental" => Ok(LoadMode::Incremental),
            "replace" => Ok(LoadMode::Replace),
            _ => Err(format!(
                "Unknown load mode: {}. Use 'incremental' or 'replace'.",
                s
            )),
        }
    }
}

/// Counts reported by one load
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadStats {
    /// Destination table
    pub table: String,
    /// Rows in the batch
    pub rows_considered: usize,
    /// Rows whose key was already stored
    pub rows_already_stored: usize,
    /// Rows dropped because another batch row had the same key
    pub rows_duplicate_in_batch: usize,
    /// Rows written
    pub rows_inserted: u64,
    /// Cells nulled because they did not fit their column type
    pub cells_nulled: usize,
    /// Whether the table was cleared first
    pub replaced: bool,
    /// Wall-clock duration
    pub duration_ms: u64,
}

/// Loads batches into a direction's table without duplicating natural keys
pub struct DedupLoader<'a> {
    backend: &'a dyn DatabaseBackend,
    policy: DuplicatePolicy,
}

impl<'a> DedupLoader<'a> {
    /// Create a loader
    pub fn new(backend: &'a dyn DatabaseBackend, policy: DuplicatePolicy) -> Self {
        Self { backend, policy }
    }

    /// Load a batch
    ///
    /// # Arguments
    /// * `direction` - Selects the destination table
    /// * `batch` - Parsed rows
    /// * `plan` - Effective plan from provisioning; only its columns are written
    /// * `mode` - Incremental or replace
    ///
    /// # Errors
    /// [`IngestError::MissingKeyColumns`] when the batch lacks any natural-key
    /// column. Store failures abort the load with nothing written.
    pub async fn load(
        &self,
        direction: Direction,
        batch: &Batch,
        plan: &ColumnPlan,
        mode: LoadMode,
    ) -> IngestResult<LoadStats> {
        let start = Instant::now();
        let table = Ident::new(direction.table_name())?;

        NaturalKey::resolve(&batch.columns).map_err(IngestError::MissingKeyColumns)?;

        // Project the batch onto the plan, under stored column names
        let mut positions = Vec::new();
        let mut names = Vec::new();
        for (idx, column) in batch.columns.iter().enumerate() {
            if let Some(planned) = plan
                .columns
                .iter()
                .find(|c| c.name.eq_ignore_ascii_case(column))
            {
                positions.push(idx);
                names.push(planned.name.clone());
            }
        }
        let key = NaturalKey::resolve(&names).map_err(IngestError::MissingKeyColumns)?;
        let key_positions: Vec<usize> = key
            .columns
            .iter()
            .filter_map(|k| names.iter().position(|n| n == k))
            .collect();

        let typed = coerce_batch(batch, plan);
        let rows: Vec<Vec<CellValue>> = typed
            .rows
            .into_iter()
            .map(|row| {
                positions
                    .iter()
                    .map(|&i| row.get(i).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();

        let mut stats = LoadStats {
            table: table.as_str().to_string(),
            rows_considered: rows.len(),
            cells_nulled: typed.cells_nulled,
            replaced: mode == LoadMode::Replace,
            ..Default::default()
        };

        let (mut rows, collapsed) = collapse_duplicates(rows, &key_positions, self.policy);
        stats.rows_duplicate_in_batch = collapsed;
        if collapsed > 0 {
            tracing::warn!(
                "{} rows share a natural key with another row in the batch; kept the {} of each",
                collapsed,
                self.policy
            );
        }

        if mode == LoadMode::Incremental {
            let stored = self.stored_keys(&table, &key.columns).await?;
            let before = rows.len();
            rows.retain(|row| !stored.contains(&NaturalKey::compose(&key_positions, row)));
            stats.rows_already_stored = before - rows.len();

            if rows.is_empty() {
                tracing::info!("No new rows for {}", table.as_str());
                stats.duration_ms = start.elapsed().as_millis() as u64;
                return Ok(stats);
            }
        }

        let columns = idents(&names)?;
        stats.rows_inserted = self.transfer(&table, &columns, &rows, mode).await?;
        stats.duration_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            "Inserted {} of {} rows into {} ({} already stored, {} duplicates in batch)",
            stats.rows_inserted,
            stats.rows_considered,
            table.as_str(),
            stats.rows_already_stored,
            stats.rows_duplicate_in_batch
        );
        Ok(stats)
    }

    /// Composite keys of every stored row
    async fn stored_keys(&self, table: &Ident, key_columns: &[String]) -> IngestResult<HashSet<String>> {
        let columns = idents(key_columns)?;
        let result = self
            .backend
            .execute_query(&TableSchema::select_columns_sql(table, &columns))
            .await?;

        let positions: Vec<usize> = (0..columns.len()).collect();
        let keys: HashSet<String> = result
            .rows
            .iter()
            .map(|row| NaturalKey::compose(&positions, row))
            .collect();
        tracing::debug!("{} stored keys in {}", keys.len(), table.as_str());
        Ok(keys)
    }

    /// Clear (in replace mode) and bulk insert as one transaction
    async fn transfer(
        &self,
        table: &Ident,
        columns: &[Ident],
        rows: &[Vec<CellValue>],
        mode: LoadMode,
    ) -> IngestResult<u64> {
        self.backend.begin().await?;

        let result = async {
            if mode == LoadMode::Replace {
                tracing::warn!("Clearing every row of {} before load", table.as_str());
                self.backend.truncate(table).await?;
            }
            let written = self.backend.bulk_insert(table, columns, rows).await?;
            self.backend.commit().await?;
            Ok::<_, crate::database::DatabaseError>(written)
        }
        .await;

        match result {
            Ok(written) => Ok(written),
            Err(e) => {
                rollback_quietly(self.backend).await;
                Err(e.into())
            }
        }
    }
}

/// Keep one row per composite key
///
/// `First` keeps the earliest row in file order, `Last` the latest. Kept rows
/// stay in file order.
///
/// # Returns
/// The kept rows and the number dropped
pub fn collapse_duplicates(
    rows: Vec<Vec<CellValue>>,
    key_positions: &[usize],
    policy: DuplicatePolicy,
) -> (Vec<Vec<CellValue>>, usize) {
    let total = rows.len();
    let mut seen = HashSet::with_capacity(total);

    let kept: Vec<Vec<CellValue>> = match policy {
        DuplicatePolicy::First => rows
            .into_iter()
            .filter(|row| seen.insert(NaturalKey::compose(key_positions, row)))
            .collect(),
        DuplicatePolicy::Last => {
            let mut kept: Vec<Vec<CellValue>> = rows
                .into_iter()
                .rev()
                .filter(|row| seen.insert(NaturalKey::compose(key_positions, row)))
                .collect();
            kept.reverse();
            kept
        }
    };

    let dropped = total - kept.len();
    (kept, dropped)
}
