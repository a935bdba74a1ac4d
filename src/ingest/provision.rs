//! Table provisioning
//!
//! Creates the destination table on first use and appends columns a batch
//! introduces. Existing columns are never dropped or retyped, and a column
//! the batch left blank takes the stored type unchecked. The uniqueness
//! constraint over the natural key is added in its own step once every key
//! column is present; a failure there is reported, not fatal, because the
//! loader deduplicates at application level regardless.

use serde::{Deserialize, Serialize};

use super::batch::Direction;
use super::error::{IngestError, IngestResult};
use super::schema::{ColumnPlan, PlannedColumn};
use crate::database::sql::{Ident, idents};
use crate::database::{
    ColumnType, DatabaseBackend, DatabaseError, TableSchema, rollback_quietly,
};

/// State of the natural-key constraint after provisioning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "detail", rename_all = "camelCase")]
pub enum ConstraintStatus {
    /// Already present before this run
    Present,
    /// Added by this run
    Added,
    /// Not added; these key columns are missing from the table
    MissingKeyColumns(Vec<String>),
    /// Not added; the store refused it (stored rows already collide)
    Rejected(String),
}

/// Result of one provisioning step
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionOutcome {
    /// Destination table
    pub table: String,
    /// Whether the table was created by this step
    pub created: bool,
    /// Columns appended to an existing table
    pub added_columns: Vec<String>,
    /// Natural-key constraint state
    pub constraint: ConstraintStatus,
    /// Plan the loader must use: stored column names and types win over the
    /// batch's inferred ones
    pub plan: ColumnPlan,
}

/// Ensures a direction's table matches a column plan
pub struct Provisioner<'a> {
    backend: &'a dyn DatabaseBackend,
    description_column: String,
}

impl<'a> Provisioner<'a> {
    /// Create a provisioner
    ///
    /// # Arguments
    /// * `backend` - Store to provision
    /// * `description_column` - Nullable label column created with the table
    pub fn new(backend: &'a dyn DatabaseBackend, description_column: impl Into<String>) -> Self {
        Self {
            backend,
            description_column: description_column.into(),
        }
    }

    /// Ensure the table for `direction` can hold batches described by `plan`
    pub async fn provision(
        &self,
        direction: Direction,
        plan: &ColumnPlan,
    ) -> IngestResult<ProvisionOutcome> {
        let table = Ident::new(direction.table_name())?;

        self.backend.begin().await?;
        let (created, added_columns, effective) = match self.apply_columns(&table, plan).await {
            Ok(result) => {
                self.backend.commit().await?;
                result
            }
            Err(e) => {
                rollback_quietly(self.backend).await;
                return Err(e);
            }
        };

        if created {
            tracing::info!("Created table {} with {} columns", table.as_str(), plan.len());
        }
        for column in &added_columns {
            tracing::info!("Added column {}.{}", table.as_str(), column);
        }

        let constraint = self.ensure_constraint(&table, &effective).await?;

        Ok(ProvisionOutcome {
            table: table.as_str().to_string(),
            created,
            added_columns,
            constraint,
            plan: effective,
        })
    }

    async fn apply_columns(
        &self,
        table: &Ident,
        plan: &ColumnPlan,
    ) -> IngestResult<(bool, Vec<String>, ColumnPlan)> {
        let planned: Vec<&PlannedColumn> = plan
            .columns
            .iter()
            .filter(|c| !c.name.eq_ignore_ascii_case(&self.description_column))
            .collect();

        if !self.backend.table_exists(table).await? {
            let mut defs = Vec::with_capacity(planned.len() + 1);
            for column in &planned {
                defs.push((Ident::new(&column.name)?, column.column_type));
            }
            defs.push((Ident::new(&self.description_column)?, ColumnType::Text));

            self.backend
                .execute(&TableSchema::create_table_sql(table, &defs))
                .await?;

            let effective = ColumnPlan {
                columns: planned.into_iter().cloned().collect(),
            };
            return Ok((true, Vec::new(), effective));
        }

        let stored = self.backend.table_columns(table).await?;
        let mut added = Vec::new();
        let mut effective = Vec::with_capacity(planned.len());

        for column in planned {
            match stored
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(&column.name))
            {
                Some((name, stored_type)) => {
                    if column.observed && !stored_type.can_hold(column.column_type) {
                        return Err(IngestError::SchemaConflict {
                            table: table.as_str().to_string(),
                            column: name.clone(),
                            stored: stored_type.to_string(),
                            incoming: column.column_type.to_string(),
                        });
                    }
                    effective.push(PlannedColumn {
                        name: name.clone(),
                        column_type: *stored_type,
                        observed: column.observed,
                    });
                }
                None => {
                    let ident = Ident::new(&column.name)?;
                    self.backend
                        .execute(&TableSchema::add_column_sql(table, &ident, column.column_type))
                        .await?;
                    added.push(column.name.clone());
                    effective.push(column.clone());
                }
            }
        }

        Ok((false, added, ColumnPlan { columns: effective }))
    }

    async fn ensure_constraint(
        &self,
        table: &Ident,
        plan: &ColumnPlan,
    ) -> IngestResult<ConstraintStatus> {
        let name = TableSchema::natural_key_constraint(table);
        if self.backend.unique_key_exists(table, &name).await? {
            return Ok(ConstraintStatus::Present);
        }

        let key = match plan.natural_key() {
            Ok(key) => key,
            Err(missing) => {
                tracing::warn!(
                    "Table {} lacks key columns {}; uniqueness enforced by the loader only",
                    table.as_str(),
                    missing.join(", ")
                );
                return Ok(ConstraintStatus::MissingKeyColumns(missing));
            }
        };
        let columns = idents(&key.columns)?;

        self.backend.begin().await?;
        let added = match self.backend.add_unique_key(table, &name, &columns).await {
            Ok(()) => self.backend.commit().await,
            Err(e) => {
                rollback_quietly(self.backend).await;
                Err(e)
            }
        };

        match added {
            Ok(()) => {
                tracing::info!("Added constraint {} on {}", name, table.as_str());
                Ok(ConstraintStatus::Added)
            }
            Err(DatabaseError::UniqueViolation(msg)) => {
                tracing::warn!(
                    "Constraint {} not added, stored rows already collide: {}",
                    name,
                    msg
                );
                Ok(ConstraintStatus::Rejected(msg))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(all(test, feature = "duckdb-backend"))]
mod tests {
    use super::*;
    use crate::database::DuckDBBackend;
    use crate::ingest::schema::NATURAL_KEY;

    fn plan(columns: &[(&str, ColumnType)]) -> ColumnPlan {
        ColumnPlan {
            columns: columns
                .iter()
                .map(|(name, ty)| PlannedColumn {
                    name: name.to_string(),
                    column_type: *ty,
                    observed: true,
                })
                .collect(),
        }
    }

    fn key_plan() -> ColumnPlan {
        let mut columns: Vec<(&str, ColumnType)> =
            NATURAL_KEY.iter().map(|k| (*k, ColumnType::Integer)).collect();
        columns.push(("KG_LIQUIDO", ColumnType::Float));
        plan(&columns)
    }

    #[tokio::test]
    async fn test_creates_table_with_constraint() {
        let backend = DuckDBBackend::in_memory().unwrap();
        let provisioner = Provisioner::new(&backend, "no_ncm_por");

        let outcome = provisioner
            .provision(Direction::Export, &key_plan())
            .await
            .unwrap();
        assert!(outcome.created);
        assert_eq!(outcome.constraint, ConstraintStatus::Added);
        assert_eq!(outcome.table, "export_data");

        let columns = backend
            .table_columns(&Ident::new("export_data").unwrap())
            .await
            .unwrap();
        assert_eq!(columns.len(), NATURAL_KEY.len() + 2);
        assert!(columns.iter().any(|(n, t)| n == "no_ncm_por" && *t == ColumnType::Text));
    }

    #[tokio::test]
    async fn test_provision_is_idempotent() {
        let backend = DuckDBBackend::in_memory().unwrap();
        let provisioner = Provisioner::new(&backend, "no_ncm_por");

        provisioner
            .provision(Direction::Import, &key_plan())
            .await
            .unwrap();
        let second = provisioner
            .provision(Direction::Import, &key_plan())
            .await
            .unwrap();
        assert!(!second.created);
        assert!(second.added_columns.is_empty());
        assert_eq!(second.constraint, ConstraintStatus::Present);
    }

    #[tokio::test]
    async fn test_missing_key_columns_skip_constraint() {
        let backend = DuckDBBackend::in_memory().unwrap();
        let provisioner = Provisioner::new(&backend, "no_ncm_por");

        let outcome = provisioner
            .provision(
                Direction::Export,
                &plan(&[("CO_ANO", ColumnType::Integer), ("CO_MES", ColumnType::Integer)]),
            )
            .await
            .unwrap();
        assert!(outcome.created);
        match outcome.constraint {
            ConstraintStatus::MissingKeyColumns(missing) => assert_eq!(missing.len(), 6),
            other => panic!("unexpected constraint state {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_appends_new_columns() {
        let backend = DuckDBBackend::in_memory().unwrap();
        let provisioner = Provisioner::new(&backend, "no_ncm_por");

        provisioner
            .provision(Direction::Export, &plan(&[("CO_ANO", ColumnType::Integer)]))
            .await
            .unwrap();
        let outcome = provisioner
            .provision(
                Direction::Export,
                &plan(&[("co_ano", ColumnType::Integer), ("VL_FOB", ColumnType::Float)]),
            )
            .await
            .unwrap();

        assert_eq!(outcome.added_columns, vec!["VL_FOB".to_string()]);
        assert_eq!(outcome.plan.names(), vec!["CO_ANO", "VL_FOB"]);
    }

    #[tokio::test]
    async fn test_incompatible_type_is_schema_conflict() {
        let backend = DuckDBBackend::in_memory().unwrap();
        let provisioner = Provisioner::new(&backend, "no_ncm_por");

        provisioner
            .provision(Direction::Export, &plan(&[("CO_ANO", ColumnType::Integer)]))
            .await
            .unwrap();
        let err = provisioner
            .provision(Direction::Export, &plan(&[("CO_ANO", ColumnType::Text)]))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::SchemaConflict { .. }));
    }

    #[tokio::test]
    async fn test_unobserved_column_adopts_stored_type() {
        let backend = DuckDBBackend::in_memory().unwrap();
        let provisioner = Provisioner::new(&backend, "no_ncm_por");

        provisioner
            .provision(Direction::Export, &key_plan())
            .await
            .unwrap();

        let mut blank = key_plan();
        for column in blank.columns.iter_mut().filter(|c| c.name == "CO_URF") {
            column.column_type = ColumnType::Text;
            column.observed = false;
        }
        let outcome = provisioner
            .provision(Direction::Export, &blank)
            .await
            .unwrap();
        assert_eq!(outcome.plan.type_of("CO_URF"), Some(ColumnType::Integer));
        assert_eq!(outcome.constraint, ConstraintStatus::Present);
    }

    #[tokio::test]
    async fn test_stored_type_wins_in_effective_plan() {
        let backend = DuckDBBackend::in_memory().unwrap();
        let provisioner = Provisioner::new(&backend, "no_ncm_por");

        provisioner
            .provision(Direction::Export, &plan(&[("VL_FOB", ColumnType::Float)]))
            .await
            .unwrap();
        let outcome = provisioner
            .provision(Direction::Export, &plan(&[("VL_FOB", ColumnType::Integer)]))
            .await
            .unwrap();
        assert_eq!(outcome.plan.type_of("VL_FOB"), Some(ColumnType::Float));
    }
}
