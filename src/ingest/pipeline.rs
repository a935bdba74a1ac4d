//! One ingestion run: read, infer, provision, load

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::batch::{Batch, Direction};
use super::error::IngestResult;
use super::loader::{DedupLoader, LoadMode, LoadStats};
use super::provision::{ProvisionOutcome, Provisioner};
use super::reader::{delimiter_byte, resolve_encoding};
use super::schema::infer_plan;
use crate::database::{DatabaseBackend, DatabaseConfig};

/// Everything one ingestion run did
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    /// Extract file, when read from disk
    pub source: Option<PathBuf>,
    /// Trade direction
    pub direction: Direction,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// Rows dropped while parsing
    pub rows_rejected: usize,
    /// Provisioning step
    pub provision: ProvisionOutcome,
    /// Load step
    pub load: LoadStats,
}

/// Read an extract file and ingest it
pub async fn ingest_file(
    backend: &dyn DatabaseBackend,
    config: &DatabaseConfig,
    path: &Path,
    direction: Direction,
    mode: LoadMode,
) -> IngestResult<IngestReport> {
    let delimiter = delimiter_byte(config.ingest.delimiter)?;
    let encoding = resolve_encoding(&config.ingest.encoding)?;
    let batch = Batch::from_path(path, delimiter, encoding)?;
    ingest_batch(backend, config, &batch, direction, mode).await
}

/// Ingest an already parsed batch
pub async fn ingest_batch(
    backend: &dyn DatabaseBackend,
    config: &DatabaseConfig,
    batch: &Batch,
    direction: Direction,
    mode: LoadMode,
) -> IngestResult<IngestReport> {
    let started_at = Utc::now();
    let plan = infer_plan(batch, &config.ingest.numeric_columns);

    let provision = Provisioner::new(backend, config.reference.description_column.as_str())
        .provision(direction, &plan)
        .await?;

    let load = DedupLoader::new(backend, config.ingest.duplicate_policy)
        .load(direction, batch, &provision.plan, mode)
        .await?;

    Ok(IngestReport {
        source: batch.source.clone(),
        direction,
        started_at,
        rows_rejected: batch.rejected_rows,
        provision,
        load,
    })
}
