//! CLI command implementations

pub mod backfill;
pub mod init;
pub mod load;
pub mod provision;
pub mod status;

use std::path::Path;

use serde::Serialize;

use crate::cli::error::CliError;
use crate::database::{DatabaseBackend, DatabaseConfig, open_backend};

/// Load the workspace configuration (defaults when absent)
pub(crate) fn load_config(workspace: &Path) -> Result<DatabaseConfig, CliError> {
    DatabaseConfig::load(workspace)
        .map_err(|e| CliError::IoError(format!("Failed to load config: {}", e)))
}

/// Build the runtime the handlers block on
pub(crate) fn runtime() -> Result<tokio::runtime::Runtime, CliError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| CliError::IoError(format!("Failed to create runtime: {}", e)))
}

/// Open the configured store
pub(crate) async fn connect(
    config: &DatabaseConfig,
    workspace: &Path,
) -> Result<Box<dyn DatabaseBackend>, CliError> {
    Ok(open_backend(config, workspace).await?)
}

/// Release the store; a failure here does not mask the run's own result
pub(crate) async fn disconnect(backend: &dyn DatabaseBackend) {
    if let Err(e) = backend.close().await {
        tracing::warn!("Failed to close {} connection: {}", backend.backend_type(), e);
    }
}

/// Print a value as pretty JSON
pub(crate) fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| CliError::SerializationError(e.to_string()))?;
    println!("{}", json);
    Ok(())
}

/// Fail early on a missing input file
pub(crate) fn require_file(path: &Path) -> Result<(), CliError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(CliError::FileNotFound(path.to_path_buf()))
    }
}
