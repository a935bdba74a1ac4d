//! DuckDB database backend implementation
//!
//! Provides an embedded store for local runs and tests. Bulk transfer is a
//! prepared insert executed once per row inside the caller's transaction.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::sql::{Ident, column_list, quote_literal};
use super::{CellValue, DatabaseBackend, DatabaseError, DatabaseResult, QueryResult};

/// DuckDB database backend
///
/// Supports both file-based persistence and in-memory mode.
pub struct DuckDBBackend {
    /// Path to the database file (None for in-memory)
    db_path: Option<PathBuf>,
    /// DuckDB connection (wrapped in Mutex for thread safety)
    connection: Mutex<duckdb::Connection>,
}

impl DuckDBBackend {
    /// Create a new DuckDB backend with a file-based database
    pub fn new(db_path: impl AsRef<Path>) -> DatabaseResult<Self> {
        let path = db_path.as_ref().to_path_buf();
        let connection = duckdb::Connection::open(&path).map_err(|e| {
            DatabaseError::ConnectionFailed(format!("Failed to open DuckDB: {}", e))
        })?;

        Ok(Self {
            db_path: Some(path),
            connection: Mutex::new(connection),
        })
    }

    /// Create an in-memory DuckDB backend
    ///
    /// Useful for testing where persistence is not needed.
    pub fn in_memory() -> DatabaseResult<Self> {
        let connection = duckdb::Connection::open_in_memory().map_err(|e| {
            DatabaseError::ConnectionFailed(format!("Failed to create in-memory DuckDB: {}", e))
        })?;

        Ok(Self {
            db_path: None,
            connection: Mutex::new(connection),
        })
    }

    /// Get the database file path (None for in-memory)
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Check if this is an in-memory database
    pub fn is_in_memory(&self) -> bool {
        self.db_path.is_none()
    }

    fn lock(&self) -> DatabaseResult<std::sync::MutexGuard<'_, duckdb::Connection>> {
        self.connection
            .lock()
            .map_err(|e| DatabaseError::ConnectionFailed(format!("Lock error: {}", e)))
    }

    /// Classify a DuckDB error
    fn map_error(context: &str, e: duckdb::Error) -> DatabaseError {
        let message = e.to_string();
        let lower = message.to_lowercase();
        if lower.contains("duplicate key") || lower.contains("unique constraint") {
            DatabaseError::UniqueViolation(format!("{}: {}", context, message))
        } else {
            DatabaseError::QueryFailed(format!("{}: {}", context, message))
        }
    }

    /// Convert a DuckDB ValueRef to a cell
    fn value_ref_to_cell(value: duckdb::types::ValueRef) -> CellValue {
        use duckdb::types::ValueRef;

        match value {
            ValueRef::Null => CellValue::Null,
            ValueRef::Boolean(b) => CellValue::Integer(i64::from(b)),
            ValueRef::TinyInt(i) => CellValue::Integer(i.into()),
            ValueRef::SmallInt(i) => CellValue::Integer(i.into()),
            ValueRef::Int(i) => CellValue::Integer(i.into()),
            ValueRef::BigInt(i) => CellValue::Integer(i),
            ValueRef::HugeInt(i) => i64::try_from(i)
                .map(CellValue::Integer)
                .unwrap_or_else(|_| CellValue::Text(i.to_string())),
            ValueRef::UTinyInt(i) => CellValue::Integer(i.into()),
            ValueRef::USmallInt(i) => CellValue::Integer(i.into()),
            ValueRef::UInt(i) => CellValue::Integer(i.into()),
            ValueRef::UBigInt(i) => i64::try_from(i)
                .map(CellValue::Integer)
                .unwrap_or_else(|_| CellValue::Text(i.to_string())),
            ValueRef::Float(f) => CellValue::Float(f as f64),
            ValueRef::Double(f) => CellValue::Float(f),
            ValueRef::Text(bytes) => CellValue::Text(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Decimal(d) => d
                .to_string()
                .parse::<f64>()
                .map(CellValue::Float)
                .unwrap_or(CellValue::Null),
            other => CellValue::Text(format!("{:?}", other)),
        }
    }

    fn cell_to_value(cell: &CellValue) -> duckdb::types::Value {
        use duckdb::types::Value;

        match cell {
            CellValue::Null => Value::Null,
            CellValue::Integer(i) => Value::BigInt(*i),
            CellValue::Float(f) => Value::Double(*f),
            CellValue::Text(s) => Value::Text(s.clone()),
        }
    }
}

#[async_trait(?Send)]
impl DatabaseBackend for DuckDBBackend {
    async fn execute(&self, sql: &str) -> DatabaseResult<u64> {
        let conn = self.lock()?;
        tracing::debug!("duckdb execute: {}", sql);

        conn.execute(sql, [])
            .map(|n| n as u64)
            .map_err(|e| Self::map_error("Execute failed", e))
    }

    async fn execute_query(&self, sql: &str) -> DatabaseResult<QueryResult> {
        let start = std::time::Instant::now();
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| Self::map_error("Prepare failed", e))?;

        // In DuckDB 1.4+, the query runs before column names are available
        let mut result_rows = stmt
            .query([])
            .map_err(|e| Self::map_error("Query failed", e))?;

        let column_count = result_rows.as_ref().map(|r| r.column_count()).unwrap_or(0);
        let columns: Vec<String> = (0..column_count)
            .map(|i| {
                result_rows
                    .as_ref()
                    .and_then(|r| r.column_name(i).ok())
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| format!("col{}", i))
            })
            .collect();

        let mut rows = Vec::new();
        while let Some(row) = result_rows
            .next()
            .map_err(|e| Self::map_error("Row fetch error", e))?
        {
            let cells = (0..column_count)
                .map(|i| {
                    row.get_ref(i)
                        .map(Self::value_ref_to_cell)
                        .unwrap_or(CellValue::Null)
                })
                .collect();
            rows.push(cells);
        }

        Ok(QueryResult {
            columns,
            rows,
            execution_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn unique_key_exists(&self, table: &Ident, name: &str) -> DatabaseResult<bool> {
        let sql = format!(
            "SELECT index_name FROM duckdb_indexes() WHERE table_name = {} AND index_name = {}",
            quote_literal(table.as_str()),
            quote_literal(name)
        );
        let result = self.execute_query(&sql).await?;
        Ok(!result.is_empty())
    }

    async fn add_unique_key(
        &self,
        table: &Ident,
        name: &str,
        columns: &[Ident],
    ) -> DatabaseResult<()> {
        let index = Ident::new(name)?;
        self.execute(&format!(
            "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {} ({})",
            index,
            table,
            column_list(columns)
        ))
        .await?;
        Ok(())
    }

    async fn truncate(&self, table: &Ident) -> DatabaseResult<()> {
        self.execute(&format!("DELETE FROM {}", table)).await?;
        Ok(())
    }

    async fn bulk_insert(
        &self,
        table: &Ident,
        columns: &[Ident],
        rows: &[Vec<CellValue>],
    ) -> DatabaseResult<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; columns.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            column_list(columns),
            placeholders
        );

        let conn = self.lock()?;
        let mut stmt = conn
            .prepare(&sql)
            .map_err(|e| Self::map_error("Prepare failed", e))?;

        let mut written = 0u64;
        for row in rows {
            if row.len() != columns.len() {
                return Err(DatabaseError::InvalidInput(format!(
                    "Row has {} cells, expected {}",
                    row.len(),
                    columns.len()
                )));
            }
            let values: Vec<duckdb::types::Value> = row.iter().map(Self::cell_to_value).collect();
            written += stmt
                .execute(duckdb::params_from_iter(values))
                .map_err(|e| Self::map_error("Insert failed", e))? as u64;
        }

        Ok(written)
    }

    async fn health_check(&self) -> DatabaseResult<bool> {
        let result = self.execute_query("SELECT 1").await?;
        Ok(!result.is_empty())
    }

    fn backend_type(&self) -> &'static str {
        "duckdb"
    }

    async fn close(&self) -> DatabaseResult<()> {
        // DuckDB connections close on drop; flush the WAL for file databases
        if !self.is_in_memory() {
            self.execute("CHECKPOINT").await?;
        }
        Ok(())
    }
}
