//! Store status command

use std::path::PathBuf;

use crate::cli::commands::{connect, disconnect, load_config, print_json, runtime};
use crate::cli::error::CliError;
use crate::ingest::table_status;

/// Status command arguments
#[derive(Debug, Clone)]
pub struct StatusArgs {
    /// Workspace path
    pub workspace: PathBuf,
    /// Print as JSON
    pub json: bool,
}

/// Show row and label counts of both trade tables
pub fn handle_status(args: &StatusArgs) -> Result<(), CliError> {
    let config = load_config(&args.workspace)?;

    let rt = runtime()?;
    rt.block_on(async {
        let backend = connect(&config, &args.workspace).await?;
        let result = table_status(backend.as_ref(), &config.reference.description_column).await;
        let backend_type = backend.backend_type();
        disconnect(backend.as_ref()).await;
        let statuses = result?;

        if args.json {
            return print_json(&statuses);
        }

        println!("Backend: {}", backend_type);
        for status in &statuses {
            if !status.exists {
                println!("{}: not created", status.table);
                continue;
            }
            println!(
                "{}: {} rows, {} labelled, natural key constraint {}",
                status.table,
                status.rows,
                status.labelled_rows,
                if status.constraint { "present" } else { "absent" }
            );
        }
        Ok(())
    })
}
