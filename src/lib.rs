//! Comex Loader - Brazilian trade-statistics ingestion
//!
//! Provides:
//! - Deduplicating loads of export/import extracts into a relational store
//! - Schema inference and lazy table provisioning
//! - Backfill of NCM descriptive labels from the reference file
//! - DuckDB and PostgreSQL store backends

pub mod database;
pub mod ingest;

#[cfg(feature = "cli")]
pub mod cli;

pub use database::{
    CellValue, ColumnType, DatabaseBackend, DatabaseConfig, DatabaseError, DatabaseResult,
};
#[cfg(feature = "duckdb-backend")]
pub use database::DuckDBBackend;
#[cfg(feature = "postgres-backend")]
pub use database::PostgresBackend;
pub use ingest::{
    BackfillReport, Backfiller, Batch, ColumnPlan, DedupLoader, Direction, IngestError,
    IngestReport, IngestResult, LoadMode, LoadStats, Provisioner, ReferenceMapping,
};
