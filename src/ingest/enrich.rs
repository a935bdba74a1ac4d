//! Descriptive-label backfill
//!
//! A [`ReferenceMapping`] read from the NCM reference file is materialized
//! into a temporary staging table and joined into each target table in one
//! `UPDATE ... FROM`. Each target is its own transaction; a failure rolls that
//! target back and the pass moves on to the next one. The staging table is
//! dropped after every target regardless of outcome.

use std::collections::BTreeMap;
use std::path::Path;

use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};

use super::error::{IngestError, IngestResult};
use super::reader::{csv_reader, decode_record, read_file, sniff_delimiter};
use crate::database::sql::Ident;
use crate::database::{
    CellValue, ColumnType, DatabaseBackend, DatabaseError, TableSchema, rollback_quietly,
};

/// Temporary table holding the mapping during one target's pass
pub const STAGING_TABLE: &str = "comex_reference_staging";

/// Width of a normalized NCM code
pub const CODE_WIDTH: usize = 8;

/// Classification code → label, last occurrence wins
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferenceMapping {
    entries: BTreeMap<String, String>,
    /// Rows skipped while reading (empty code or label)
    pub skipped_rows: usize,
}

impl ReferenceMapping {
    /// Create an empty mapping
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, replacing any earlier label for the same code
    pub fn insert(&mut self, code: &str, label: impl Into<String>) {
        self.entries.insert(normalize_code(code), label.into());
    }

    /// Label for a code
    pub fn get(&self, code: &str) -> Option<&str> {
        self.entries.get(&normalize_code(code)).map(String::as_str)
    }

    /// Number of distinct codes
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the mapping is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in code order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(c, l)| (c.as_str(), l.as_str()))
    }

    /// Read the reference file
    ///
    /// # Arguments
    /// * `path` - Reference file
    /// * `encoding` - Its text encoding, typically ISO-8859-1
    /// * `code_column` - Header of the code column (case-insensitive)
    /// * `label_column` - Header of the label column (case-insensitive)
    pub fn from_path(
        path: &Path,
        encoding: &'static Encoding,
        code_column: &str,
        label_column: &str,
    ) -> IngestResult<Self> {
        let bytes = read_file(path)?;
        let mapping = Self::from_bytes(&bytes, encoding, code_column, label_column).map_err(|e| {
            match e {
                IngestError::Parse { message, .. } => IngestError::Parse {
                    path: path.to_path_buf(),
                    message,
                },
                other => other,
            }
        })?;
        tracing::info!(
            "Read {} reference codes from {} ({} rows skipped)",
            mapping.len(),
            path.display(),
            mapping.skipped_rows
        );
        Ok(mapping)
    }

    /// Parse reference text; the delimiter is sniffed from the header line
    pub fn from_bytes(
        bytes: &[u8],
        encoding: &'static Encoding,
        code_column: &str,
        label_column: &str,
    ) -> IngestResult<Self> {
        let header_line = bytes.split(|b| *b == b'\n').next().unwrap_or_default();
        let mut reader = csv_reader(bytes, sniff_delimiter(header_line));
        let mut records = reader.byte_records();

        let header = match records.next() {
            Some(record) => decode_record(&record.map_err(|e| parse_error(e.to_string()))?, encoding),
            None => return Err(parse_error("Reference file has no header row".to_string())),
        };
        let find = |name: &str| {
            header
                .iter()
                .position(|h| h.eq_ignore_ascii_case(name))
                .ok_or_else(|| parse_error(format!("Reference file has no {} column", name)))
        };
        let code_idx = find(code_column)?;
        let label_idx = find(label_column)?;

        let mut mapping = Self::new();
        for (index, record) in records.enumerate() {
            let record = record.map_err(|e| parse_error(format!("Row {}: {}", index + 1, e)))?;
            let cells = decode_record(&record, encoding);
            let code = cells.get(code_idx).map(String::as_str).unwrap_or_default();
            let label = cells.get(label_idx).map(String::as_str).unwrap_or_default();

            if code.is_empty() || label.is_empty() {
                if cells.iter().any(|c| !c.is_empty()) {
                    tracing::warn!("Reference row {} has an empty code or label; skipped", index + 1);
                    mapping.skipped_rows += 1;
                }
                continue;
            }
            mapping.insert(code, label);
        }

        Ok(mapping)
    }
}

fn parse_error(message: String) -> IngestError {
    IngestError::Parse {
        path: Default::default(),
        message,
    }
}

/// Zero-pad all-digit codes to [`CODE_WIDTH`]; other codes are kept as-is
pub fn normalize_code(raw: &str) -> String {
    let code = raw.trim().trim_matches('"').trim();
    if !code.is_empty() && code.bytes().all(|b| b.is_ascii_digit()) && code.len() < CODE_WIDTH {
        format!("{:0>width$}", code, width = CODE_WIDTH)
    } else {
        code.to_string()
    }
}

/// Render a normalized code as a staging value of the target key column's type
pub fn code_cell(code: &str, column_type: ColumnType) -> IngestResult<CellValue> {
    let reason = |what: &str| IngestError::ReferenceCode {
        code: code.to_string(),
        reason: format!("not {} like the target key column", what),
    };
    match column_type {
        ColumnType::Integer => code
            .parse::<i64>()
            .map(CellValue::Integer)
            .map_err(|_| reason("an integer")),
        ColumnType::Float => code
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(CellValue::Float)
            .ok_or_else(|| reason("a number")),
        ColumnType::Text => Ok(CellValue::Text(code.to_string())),
    }
}

/// Outcome of one target's pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "camelCase")]
pub enum BackfillStatus {
    /// The join ran and committed
    Updated,
    /// The target was not attempted
    Skipped(String),
    /// The pass failed and was rolled back
    Failed(String),
}

/// Per-target backfill report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillReport {
    /// Target table
    pub table: String,
    /// Outcome
    pub status: BackfillStatus,
    /// Rows whose label changed
    pub rows_updated: u64,
    /// Mapping entries whose code could not be normalized for this table
    pub codes_skipped: usize,
}

impl BackfillReport {
    fn new(table: &str, status: BackfillStatus) -> Self {
        Self {
            table: table.to_string(),
            status,
            rows_updated: 0,
            codes_skipped: 0,
        }
    }
}

/// Populates the descriptive column of loaded tables from a reference mapping
pub struct Backfiller<'a> {
    backend: &'a dyn DatabaseBackend,
    code_column: String,
    description_column: String,
}

impl<'a> Backfiller<'a> {
    /// Create a backfiller
    ///
    /// # Arguments
    /// * `backend` - Store holding the targets
    /// * `code_column` - Classification code column of the targets
    /// * `description_column` - Column receiving the labels
    pub fn new(
        backend: &'a dyn DatabaseBackend,
        code_column: impl Into<String>,
        description_column: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            code_column: code_column.into(),
            description_column: description_column.into(),
        }
    }

    /// Run one pass per target table
    ///
    /// A missing or failing target is reported and the next one is attempted.
    /// Losing the store connection ends the whole run.
    pub async fn backfill<S: AsRef<str>>(
        &self,
        mapping: &ReferenceMapping,
        targets: &[S],
    ) -> IngestResult<Vec<BackfillReport>> {
        let mut reports = Vec::with_capacity(targets.len());

        for target in targets {
            let target = target.as_ref();
            let report = match self.backfill_table(mapping, target).await {
                Ok(report) => report,
                Err(e @ IngestError::Connectivity(_)) => return Err(e),
                Err(e) => {
                    tracing::warn!("Backfill of {} failed: {}", target, e);
                    BackfillReport::new(target, BackfillStatus::Failed(e.to_string()))
                }
            };
            reports.push(report);
        }

        Ok(reports)
    }

    async fn backfill_table(
        &self,
        mapping: &ReferenceMapping,
        target: &str,
    ) -> IngestResult<BackfillReport> {
        let table = Ident::new(target)?;
        if !self.backend.table_exists(&table).await? {
            tracing::warn!("Table {} does not exist; skipped", target);
            return Ok(BackfillReport::new(
                target,
                BackfillStatus::Skipped("table does not exist".to_string()),
            ));
        }

        let stored = self.backend.table_columns(&table).await?;
        let Some((code_name, code_type)) = stored
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(&self.code_column))
        else {
            return Ok(BackfillReport::new(
                target,
                BackfillStatus::Skipped(format!("no {} column", self.code_column)),
            ));
        };
        let description = stored
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(&self.description_column))
            .map(|(name, _)| name.clone());

        let mut codes_skipped = 0;
        let rows: Vec<Vec<CellValue>> = mapping
            .iter()
            .filter_map(|(code, label)| match code_cell(code, *code_type) {
                Ok(cell) => Some(vec![cell, CellValue::Text(label.to_string())]),
                Err(e) => {
                    tracing::warn!("{}; skipped", e);
                    codes_skipped += 1;
                    None
                }
            })
            .collect();

        let code_column = Ident::new(code_name)?;
        let staging = Ident::new(STAGING_TABLE)?;

        self.backend.begin().await?;
        let result = self
            .join_into(&table, &code_column, *code_type, description, &staging, &rows)
            .await;
        let result = match result {
            Ok(updated) => self.backend.commit().await.map(|_| updated),
            Err(e) => {
                rollback_quietly(self.backend).await;
                Err(e)
            }
        };
        self.drop_staging(&staging).await;

        let rows_updated = result?;
        tracing::info!("Backfilled {} rows of {}", rows_updated, target);

        Ok(BackfillReport {
            table: target.to_string(),
            status: BackfillStatus::Updated,
            rows_updated,
            codes_skipped,
        })
    }

    async fn join_into(
        &self,
        table: &Ident,
        code_column: &Ident,
        code_type: ColumnType,
        description: Option<String>,
        staging: &Ident,
        rows: &[Vec<CellValue>],
    ) -> Result<u64, DatabaseError> {
        let description = match description {
            Some(name) => Ident::new(&name)?,
            None => {
                let ident = Ident::new(&self.description_column)?;
                tracing::info!("Adding column {}.{}", table.as_str(), ident.as_str());
                self.backend
                    .execute(&TableSchema::add_column_sql(table, &ident, ColumnType::Text))
                    .await?;
                ident
            }
        };

        self.backend
            .execute(&format!("DROP TABLE IF EXISTS {}", staging))
            .await?;
        self.backend
            .execute(&format!(
                "CREATE TEMPORARY TABLE {} (code {}, label TEXT)",
                staging,
                code_type.sql_type()
            ))
            .await?;

        let staging_columns = [Ident::new("code")?, Ident::new("label")?];
        let staged = self
            .backend
            .bulk_insert(staging, &staging_columns, rows)
            .await?;
        tracing::debug!("Staged {} reference rows", staged);

        self.backend
            .execute(&format!(
                "UPDATE {table} AS t SET {desc} = s.label FROM {staging} AS s \
                 WHERE t.{code} = s.code AND t.{desc} IS DISTINCT FROM s.label",
                table = table,
                desc = description,
                staging = staging,
                code = code_column
            ))
            .await
    }

    async fn drop_staging(&self, staging: &Ident) {
        if let Err(e) = self
            .backend
            .execute(&format!("DROP TABLE IF EXISTS {}", staging))
            .await
        {
            tracing::warn!("Failed to drop {}: {}", staging.as_str(), e);
        }
    }
}
