//! Workspace initialization command

use std::path::PathBuf;

use crate::cli::commands::{connect, disconnect, runtime};
use crate::cli::error::CliError;
use crate::database::config::CONFIG_FILENAME;
use crate::database::{DatabaseBackendType, DatabaseConfig};

/// Init command arguments
#[derive(Debug, Clone)]
pub struct InitArgs {
    /// Workspace path
    pub workspace: PathBuf,
    /// Store backend (duckdb, postgres)
    pub backend: String,
    /// PostgreSQL connection string (required for postgres backend)
    pub connection_string: Option<String>,
    /// Overwrite an existing configuration
    pub force: bool,
}

/// Write `.comex.toml` and verify the store is reachable
pub fn handle_init(args: &InitArgs) -> Result<(), CliError> {
    let workspace = &args.workspace;
    if !workspace.is_dir() {
        return Err(CliError::FileNotFound(workspace.clone()));
    }
    if DatabaseConfig::exists(workspace) && !args.force {
        return Err(CliError::InvalidArgument(format!(
            "{} already exists in {}. Use --force to overwrite.",
            CONFIG_FILENAME,
            workspace.display()
        )));
    }

    let backend_type: DatabaseBackendType = args
        .backend
        .parse()
        .map_err(|e: String| CliError::InvalidArgument(e))?;

    let config = match backend_type {
        DatabaseBackendType::DuckDB => DatabaseConfig::duckdb(
            crate::database::config::DEFAULT_DUCKDB_FILENAME,
        ),
        DatabaseBackendType::Postgres => {
            let conn_str = args.connection_string.as_ref().ok_or_else(|| {
                CliError::InvalidArgument(
                    "--connection-string is required for the postgres backend".to_string(),
                )
            })?;
            DatabaseConfig::postgres(conn_str.clone())
        }
    };

    config.save(workspace)?;
    println!("Wrote {}", workspace.join(CONFIG_FILENAME).display());

    let rt = runtime()?;
    rt.block_on(async {
        let backend = connect(&config, workspace).await?;
        let healthy = backend.health_check().await;
        disconnect(backend.as_ref()).await;

        if healthy? {
            println!("Store reachable ({})", backend_type);
        }
        Ok(())
    })
}

#[cfg(all(test, feature = "duckdb-backend"))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_duckdb_workspace() {
        let dir = TempDir::new().unwrap();
        let args = InitArgs {
            workspace: dir.path().to_path_buf(),
            backend: "duckdb".to_string(),
            connection_string: None,
            force: false,
        };

        handle_init(&args).unwrap();
        assert!(DatabaseConfig::exists(dir.path()));
        assert!(dir.path().join(".comex.duckdb").exists());

        let err = handle_init(&args).unwrap_err();
        assert!(matches!(err, CliError::InvalidArgument(_)));
    }

    #[test]
    fn test_init_postgres_requires_connection_string() {
        let dir = TempDir::new().unwrap();
        let args = InitArgs {
            workspace: dir.path().to_path_buf(),
            backend: "postgres".to_string(),
            connection_string: None,
            force: false,
        };
        assert!(matches!(
            handle_init(&args),
            Err(CliError::InvalidArgument(_))
        ));
    }
}
