//! Trade-statistics ingestion
//!
//! Components, in the order a run uses them:
//! - [`schema`]: infers a [`ColumnPlan`] from a parsed [`Batch`]
//! - [`provision`]: creates or extends the direction's table
//! - [`loader`]: inserts only rows whose natural key is new
//! - [`enrich`]: backfills the descriptive label from the NCM reference file
//!
//! [`pipeline::ingest_file`] chains the first three.

pub mod batch;
pub mod copy;
pub mod enrich;
pub mod error;
pub mod loader;
pub mod pipeline;
pub mod provision;
pub mod reader;
pub mod schema;
pub mod status;

pub use batch::{Batch, Direction};
pub use enrich::{BackfillReport, BackfillStatus, Backfiller, ReferenceMapping};
pub use error::{IngestError, IngestResult};
pub use loader::{DedupLoader, LoadMode, LoadStats};
pub use pipeline::{IngestReport, ingest_batch, ingest_file};
pub use provision::{ConstraintStatus, ProvisionOutcome, Provisioner};
pub use schema::{ColumnPlan, NATURAL_KEY, NaturalKey, PlannedColumn, infer_plan};
pub use status::{TableStatus, table_status};
