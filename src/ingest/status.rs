//! Read-only summary of the trade tables

use serde::{Deserialize, Serialize};

use super::batch::Direction;
use super::error::IngestResult;
use crate::database::sql::Ident;
use crate::database::{DatabaseBackend, TableSchema};

/// State of one direction's table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableStatus {
    pub table: String,
    pub exists: bool,
    pub rows: u64,
    /// Rows whose descriptive label is set
    pub labelled_rows: u64,
    /// Whether the natural-key constraint is present
    pub constraint: bool,
}

/// Summarize both trade tables
pub async fn table_status(
    backend: &dyn DatabaseBackend,
    description_column: &str,
) -> IngestResult<Vec<TableStatus>> {
    let mut statuses = Vec::with_capacity(Direction::ALL.len());

    for direction in Direction::ALL {
        let table = Ident::new(direction.table_name())?;
        if !backend.table_exists(&table).await? {
            statuses.push(TableStatus {
                table: table.as_str().to_string(),
                exists: false,
                rows: 0,
                labelled_rows: 0,
                constraint: false,
            });
            continue;
        }

        let rows = backend.count(&TableSchema::count_sql(&table)).await?;
        let description = backend
            .table_columns(&table)
            .await?
            .into_iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(description_column));
        let labelled_rows = match description {
            Some((name, _)) => {
                let column = Ident::new(&name)?;
                backend
                    .count(&TableSchema::count_not_null_sql(&table, &column))
                    .await?
            }
            None => 0,
        };
        let constraint = backend
            .unique_key_exists(&table, &TableSchema::natural_key_constraint(&table))
            .await?;

        statuses.push(TableStatus {
            table: table.as_str().to_string(),
            exists: true,
            rows,
            labelled_rows,
            constraint,
        });
    }

    Ok(statuses)
}

#[cfg(all(test, feature = "duckdb-backend"))]
mod tests {
    use super::*;
    use crate::database::DuckDBBackend;

    #[tokio::test]
    async fn test_status_of_empty_store() {
        let backend = DuckDBBackend::in_memory().unwrap();
        let statuses = table_status(&backend, "no_ncm_por").await.unwrap();
        assert_eq!(statuses.len(), 2);
        assert!(statuses.iter().all(|s| !s.exists && s.rows == 0));
        assert_eq!(statuses[0].table, "export_data");
    }
}
