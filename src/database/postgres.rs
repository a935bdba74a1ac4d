//! PostgreSQL database backend implementation
//!
//! Provides the production store. Bulk transfer streams the tab-delimited
//! `COPY` text encoding produced by [`crate::ingest::copy`].

use async_trait::async_trait;
use futures_util::{SinkExt, pin_mut};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_postgres::error::SqlState;

use super::sql::{Ident, column_list, quote_literal};
use super::{CellValue, DatabaseBackend, DatabaseError, DatabaseResult, QueryResult};
use crate::ingest::copy::{copy_statement, encode_rows};

/// PostgreSQL database backend
///
/// Holds one client for the whole run so that `BEGIN`/`COMMIT` issued through
/// [`DatabaseBackend::execute`] scope every statement in between.
pub struct PostgresBackend {
    /// Connection string
    connection_string: String,
    /// PostgreSQL client (wrapped for async access)
    client: Arc<Mutex<tokio_postgres::Client>>,
}

impl PostgresBackend {
    /// Create a new PostgreSQL backend
    ///
    /// # Arguments
    /// * `connection_string` - PostgreSQL connection string
    pub async fn new(connection_string: &str) -> DatabaseResult<Self> {
        let (client, connection) =
            tokio_postgres::connect(connection_string, tokio_postgres::NoTls)
                .await
                .map_err(|e| {
                    DatabaseError::ConnectionFailed(format!(
                        "Failed to connect to PostgreSQL: {}",
                        e
                    ))
                })?;

        // Spawn connection handler
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("PostgreSQL connection error: {}", e);
            }
        });

        Ok(Self {
            connection_string: connection_string.to_string(),
            client: Arc::new(Mutex::new(client)),
        })
    }

    /// Get the connection string (masked for security)
    pub fn connection_string_masked(&self) -> String {
        if let Some(at_pos) = self.connection_string.find('@')
            && let Some(colon_pos) = self.connection_string[..at_pos].rfind(':')
        {
            let prefix = &self.connection_string[..colon_pos + 1];
            let suffix = &self.connection_string[at_pos..];
            return format!("{}****{}", prefix, suffix);
        }
        self.connection_string.clone()
    }

    /// Classify a driver error
    fn map_error(context: &str, e: tokio_postgres::Error) -> DatabaseError {
        if e.is_closed() {
            return DatabaseError::ConnectionFailed(format!("{}: {}", context, e));
        }
        match e.code() {
            Some(code) if *code == SqlState::UNIQUE_VIOLATION => {
                DatabaseError::UniqueViolation(format!("{}: {}", context, e))
            }
            _ => DatabaseError::QueryFailed(format!("{}: {}", context, e)),
        }
    }

    /// Get a column value as a cell
    fn get_column_value(row: &tokio_postgres::Row, idx: usize) -> CellValue {
        if let Ok(v) = row.try_get::<_, Option<String>>(idx) {
            return v.map(CellValue::Text).unwrap_or_default();
        }
        if let Ok(v) = row.try_get::<_, Option<i64>>(idx) {
            return v.map(CellValue::Integer).unwrap_or_default();
        }
        if let Ok(v) = row.try_get::<_, Option<i32>>(idx) {
            return v.map(|n| CellValue::Integer(n.into())).unwrap_or_default();
        }
        if let Ok(v) = row.try_get::<_, Option<i16>>(idx) {
            return v.map(|n| CellValue::Integer(n.into())).unwrap_or_default();
        }
        if let Ok(v) = row.try_get::<_, Option<f64>>(idx) {
            return v.map(CellValue::Float).unwrap_or_default();
        }
        if let Ok(v) = row.try_get::<_, Option<f32>>(idx) {
            return v.map(|n| CellValue::Float(n.into())).unwrap_or_default();
        }
        if let Ok(v) = row.try_get::<_, Option<bool>>(idx) {
            return v.map(|b| CellValue::Integer(b.into())).unwrap_or_default();
        }

        CellValue::Null
    }
}

#[async_trait(?Send)]
impl DatabaseBackend for PostgresBackend {
    async fn execute(&self, sql: &str) -> DatabaseResult<u64> {
        let client = self.client.lock().await;
        tracing::debug!("postgres execute: {}", sql);

        client
            .execute(sql, &[])
            .await
            .map_err(|e| Self::map_error("Execute failed", e))
    }

    async fn execute_query(&self, sql: &str) -> DatabaseResult<QueryResult> {
        let start = std::time::Instant::now();
        let client = self.client.lock().await;

        let rows = client
            .query(sql, &[])
            .await
            .map_err(|e| Self::map_error("Query failed", e))?;

        let columns: Vec<String> = rows
            .first()
            .map(|row| {
                row.columns()
                    .iter()
                    .map(|c| c.name().to_string())
                    .collect()
            })
            .unwrap_or_default();

        let cells = rows
            .iter()
            .map(|row| {
                (0..row.len())
                    .map(|i| Self::get_column_value(row, i))
                    .collect()
            })
            .collect();

        Ok(QueryResult {
            columns,
            rows: cells,
            execution_time_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn unique_key_exists(&self, table: &Ident, name: &str) -> DatabaseResult<bool> {
        let sql = format!(
            "SELECT conname FROM pg_constraint \
             WHERE conrelid = to_regclass({}) AND conname = {} AND contype = 'u'",
            quote_literal(&table.quoted()),
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
        let constraint = Ident::new(name)?;
        self.execute(&format!(
            "ALTER TABLE {} ADD CONSTRAINT {} UNIQUE ({})",
            table,
            constraint,
            column_list(columns)
        ))
        .await?;
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

        let payload = encode_rows(rows);
        let statement = copy_statement(table, columns);
        tracing::debug!("{} ({} bytes)", statement, payload.len());

        let client = self.client.lock().await;
        let sink = client
            .copy_in::<_, bytes::Bytes>(statement.as_str())
            .await
            .map_err(|e| Self::map_error("COPY failed", e))?;
        pin_mut!(sink);

        sink.send(bytes::Bytes::from(payload))
            .await
            .map_err(|e| Self::map_error("COPY send failed", e))?;

        sink.finish()
            .await
            .map_err(|e| Self::map_error("COPY finish failed", e))
    }

    async fn health_check(&self) -> DatabaseResult<bool> {
        let client = self.client.lock().await;
        client
            .simple_query("SELECT 1")
            .await
            .map(|_| true)
            .map_err(|e| Self::map_error("Health check failed", e))
    }

    fn backend_type(&self) -> &'static str {
        "postgres"
    }

    async fn close(&self) -> DatabaseResult<()> {
        // The connection task ends once the client is dropped
        tracing::debug!("Closing PostgreSQL connection {}", self.connection_string_masked());
        Ok(())
    }
}
