//! Relational store abstraction
//!
//! This module provides the store layer the loader writes to:
//! - DuckDB: Embedded database, file-backed or in-memory
//! - PostgreSQL: Server deployments, bulk transfer over `COPY`
//!
//! Components never build SQL from raw caller text; identifiers go through
//! [`sql::Ident`] and values through [`sql::quote_literal`] or the typed
//! [`CellValue`] path of [`DatabaseBackend::bulk_insert`].

use async_trait::async_trait;
use std::path::Path;

#[cfg(feature = "duckdb-backend")]
pub mod duckdb;

#[cfg(feature = "postgres-backend")]
pub mod postgres;

pub mod config;
pub mod schema;
pub mod sql;
pub mod value;

#[cfg(feature = "duckdb-backend")]
pub use self::duckdb::DuckDBBackend;

#[cfg(feature = "postgres-backend")]
pub use self::postgres::PostgresBackend;

pub use config::{DatabaseBackendType, DatabaseConfig};
pub use schema::{ColumnType, TableSchema};
pub use sql::Ident;
pub use value::CellValue;

/// Error type for database operations
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    /// Failed to connect to database, or the connection dropped
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A uniqueness constraint rejected a write
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// Transaction control failed
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),
}

/// Result type for database operations
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// Query result set
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    /// Column names
    pub columns: Vec<String>,
    /// Rows of typed cells, positional with `columns`
    pub rows: Vec<Vec<CellValue>>,
    /// Execution time in milliseconds
    pub execution_time_ms: u64,
}

impl QueryResult {
    /// Create a new query result
    pub fn new(columns: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self {
            columns,
            rows,
            execution_time_ms: 0,
        }
    }

    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Check if the result is empty
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First cell of the first row, typically a `COUNT(*)`
    pub fn scalar(&self) -> Option<&CellValue> {
        self.rows.first().and_then(|r| r.first())
    }
}

/// Database backend trait for the loader's store interactions
///
/// Every write the components perform runs between [`begin`](Self::begin)
/// and [`commit`](Self::commit) / [`rollback`](Self::rollback) on the
/// backend's single connection.
#[async_trait(?Send)]
pub trait DatabaseBackend: Send + Sync {
    /// Execute a statement that doesn't return rows
    ///
    /// # Returns
    /// Number of rows affected
    async fn execute(&self, sql: &str) -> DatabaseResult<u64>;

    /// Execute a SQL query and return typed rows
    async fn execute_query(&self, sql: &str) -> DatabaseResult<QueryResult>;

    /// Check whether a named uniqueness constraint exists on a table
    async fn unique_key_exists(&self, table: &Ident, name: &str) -> DatabaseResult<bool>;

    /// Create a named uniqueness constraint over `columns`
    async fn add_unique_key(
        &self,
        table: &Ident,
        name: &str,
        columns: &[Ident],
    ) -> DatabaseResult<()>;

    /// Transfer rows into a table in one bulk operation
    ///
    /// # Arguments
    /// * `table` - Destination table
    /// * `columns` - Destination columns, positional with each row
    /// * `rows` - Typed rows
    ///
    /// # Returns
    /// Number of rows written
    async fn bulk_insert(
        &self,
        table: &Ident,
        columns: &[Ident],
        rows: &[Vec<CellValue>],
    ) -> DatabaseResult<u64>;

    /// Check if database is healthy and accessible
    async fn health_check(&self) -> DatabaseResult<bool>;

    /// Get the database backend type name ("duckdb" or "postgres")
    fn backend_type(&self) -> &'static str;

    /// Close the database connection
    async fn close(&self) -> DatabaseResult<()>;

    /// Remove every row of a table
    async fn truncate(&self, table: &Ident) -> DatabaseResult<()> {
        self.execute(&format!("TRUNCATE TABLE {}", table)).await?;
        Ok(())
    }

    /// Open a transaction
    async fn begin(&self) -> DatabaseResult<()> {
        self.execute("BEGIN")
            .await
            .map(|_| ())
            .map_err(|e| transaction_error("BEGIN", e))
    }

    /// Commit the open transaction
    async fn commit(&self) -> DatabaseResult<()> {
        self.execute("COMMIT")
            .await
            .map(|_| ())
            .map_err(|e| transaction_error("COMMIT", e))
    }

    /// Roll back the open transaction
    async fn rollback(&self) -> DatabaseResult<()> {
        self.execute("ROLLBACK")
            .await
            .map(|_| ())
            .map_err(|e| transaction_error("ROLLBACK", e))
    }

    /// Check if a table exists in the current schema
    async fn table_exists(&self, table: &Ident) -> DatabaseResult<bool> {
        let result = self
            .execute_query(&TableSchema::table_exists_sql(table))
            .await?;
        Ok(!result.is_empty())
    }

    /// Column names and types of a table, in ordinal order
    async fn table_columns(&self, table: &Ident) -> DatabaseResult<Vec<(String, ColumnType)>> {
        let result = self
            .execute_query(&TableSchema::table_columns_sql(table))
            .await?;

        Ok(result
            .rows
            .iter()
            .filter_map(|row| match (row.first(), row.get(1)) {
                (Some(CellValue::Text(name)), Some(CellValue::Text(ty))) => {
                    Some((name.clone(), ColumnType::from_sql_type(ty)))
                }
                _ => None,
            })
            .collect())
    }

    /// Count rows matching a `COUNT(*)` query
    async fn count(&self, sql: &str) -> DatabaseResult<u64> {
        let result = self.execute_query(sql).await?;
        match result.scalar() {
            Some(CellValue::Integer(n)) => Ok(*n as u64),
            Some(CellValue::Float(n)) => Ok(*n as u64),
            other => Err(DatabaseError::QueryFailed(format!(
                "Expected a count, got {:?}",
                other
            ))),
        }
    }
}

/// Wrap a failed transaction statement; a lost connection passes through
/// unchanged so callers still see it as a connectivity failure
pub fn transaction_error(statement: &str, e: DatabaseError) -> DatabaseError {
    match e {
        e @ DatabaseError::ConnectionFailed(_) => e,
        other => DatabaseError::TransactionFailed(format!("{}: {}", statement, other)),
    }
}

/// Roll back after a failed unit of work, keeping the original error.
///
/// A rollback failure is logged; the error that caused the rollback is the
/// one surfaced to the caller.
pub async fn rollback_quietly(backend: &dyn DatabaseBackend) {
    if let Err(e) = backend.rollback().await {
        tracing::warn!("Rollback failed: {}", e);
    }
}

/// Open the backend selected by a configuration
///
/// This is the single acquisition point for a run's store connection. The
/// caller owns the returned backend and must [`close`](DatabaseBackend::close)
/// it on every exit path.
pub async fn open_backend(
    config: &DatabaseConfig,
    workspace_path: &Path,
) -> DatabaseResult<Box<dyn DatabaseBackend>> {
    match config.database.backend {
        DatabaseBackendType::DuckDB => {
            #[cfg(feature = "duckdb-backend")]
            {
                let path = config.get_duckdb_path(workspace_path);
                tracing::info!("Opening DuckDB store at {}", path.display());
                Ok(Box::new(DuckDBBackend::new(&path)?))
            }
            #[cfg(not(feature = "duckdb-backend"))]
            {
                let _ = workspace_path;
                Err(DatabaseError::ConfigError(
                    "DuckDB backend not enabled. Build with --features duckdb-backend".to_string(),
                ))
            }
        }
        DatabaseBackendType::Postgres => {
            #[cfg(feature = "postgres-backend")]
            {
                let conn_str = config.get_postgres_connection_string().ok_or_else(|| {
                    DatabaseError::ConfigError(
                        "PostgreSQL connection string not configured".to_string(),
                    )
                })?;
                tracing::info!("Connecting to PostgreSQL");
                Ok(Box::new(PostgresBackend::new(conn_str).await?))
            }
            #[cfg(not(feature = "postgres-backend"))]
            {
                Err(DatabaseError::ConfigError(
                    "PostgreSQL backend not enabled. Build with --features postgres-backend"
                        .to_string(),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_result_empty() {
        let result = QueryResult::default();
        assert!(result.is_empty());
        assert_eq!(result.row_count(), 0);
        assert!(result.scalar().is_none());
    }

    #[test]
    fn test_query_result_scalar() {
        let result = QueryResult::new(
            vec!["row_count".to_string()],
            vec![vec![CellValue::Integer(7)]],
        );
        assert_eq!(result.scalar(), Some(&CellValue::Integer(7)));
    }

    #[test]
    fn test_transaction_error_keeps_lost_connection() {
        let err = transaction_error(
            "BEGIN",
            DatabaseError::ConnectionFailed("connection closed".to_string()),
        );
        assert!(matches!(err, DatabaseError::ConnectionFailed(ref m) if m == "connection closed"));

        let err = transaction_error(
            "COMMIT",
            DatabaseError::QueryFailed("cannot commit".to_string()),
        );
        match err {
            DatabaseError::TransactionFailed(msg) => {
                assert_eq!(msg, "COMMIT: Query failed: cannot commit")
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_error_display() {
        let err = DatabaseError::UniqueViolation("export_data_natural_key".to_string());
        assert_eq!(
            err.to_string(),
            "Unique constraint violated: export_data_natural_key"
        );
    }
}
