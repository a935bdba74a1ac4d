//! Error types for ingestion and enrichment

use std::path::PathBuf;

use thiserror::Error;

use crate::database::DatabaseError;

/// Errors from parsing, provisioning, loading and backfilling
#[derive(Error, Debug)]
pub enum IngestError {
    /// Malformed input file or row
    #[error("Parse error in {path}: {message}")]
    Parse { path: PathBuf, message: String },

    /// Existing table cannot take the batch without losing data
    #[error("Schema conflict on {table}.{column}: stored as {stored}, batch needs {incoming}")]
    SchemaConflict {
        table: String,
        column: String,
        stored: String,
        incoming: String,
    },

    /// The store rejected a row despite application-level dedup
    #[error("Duplicate key violation: {0}")]
    DuplicateKeyViolation(String),

    /// Store unreachable or connection lost
    #[error("Store connectivity error: {0}")]
    Connectivity(String),

    /// Reference code that cannot be normalized for the target key column
    #[error("Reference code {code:?} cannot be normalized: {reason}")]
    ReferenceCode { code: String, reason: String },

    /// Natural key columns missing from a batch; novelty cannot be decided
    #[error("Batch is missing natural key columns: {}", .0.join(", "))]
    MissingKeyColumns(Vec<String>),

    /// Unknown text encoding label
    #[error("Unknown encoding: {0}")]
    UnknownEncoding(String),

    /// Input file could not be read
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Any other store failure
    #[error("Store error: {0}")]
    Store(DatabaseError),
}

impl From<DatabaseError> for IngestError {
    fn from(e: DatabaseError) -> Self {
        match e {
            DatabaseError::ConnectionFailed(msg) => IngestError::Connectivity(msg),
            DatabaseError::UniqueViolation(msg) => IngestError::DuplicateKeyViolation(msg),
            other => IngestError::Store(other),
        }
    }
}

/// Result type for ingestion operations
pub type IngestResult<T> = Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_to_taxonomy() {
        let err: IngestError = DatabaseError::ConnectionFailed("refused".into()).into();
        assert!(matches!(err, IngestError::Connectivity(_)));

        let err: IngestError = DatabaseError::UniqueViolation("export_data_natural_key".into()).into();
        assert!(matches!(err, IngestError::DuplicateKeyViolation(_)));

        let err: IngestError = DatabaseError::QueryFailed("syntax".into()).into();
        assert!(matches!(err, IngestError::Store(_)));
    }

    #[test]
    fn test_missing_key_columns_message() {
        let err = IngestError::MissingKeyColumns(vec!["CO_VIA".into(), "CO_URF".into()]);
        assert_eq!(
            err.to_string(),
            "Batch is missing natural key columns: CO_VIA, CO_URF"
        );
    }
}
