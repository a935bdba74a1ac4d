//! Table provisioning command

use std::path::PathBuf;

use crate::cli::commands::{connect, disconnect, load_config, print_json, require_file, runtime};
use crate::cli::error::CliError;
use crate::ingest::provision::ConstraintStatus;
use crate::ingest::reader::{delimiter_byte, resolve_encoding};
use crate::ingest::{Batch, Direction, Provisioner, infer_plan};

/// Provision command arguments
#[derive(Debug, Clone)]
pub struct ProvisionArgs {
    /// Workspace path
    pub workspace: PathBuf,
    /// Trade direction
    pub direction: Direction,
    /// Sample extract the column plan is inferred from
    pub file: PathBuf,
    /// Print the outcome as JSON
    pub json: bool,
}

/// Create or extend a direction's table from a sample extract
pub fn handle_provision(args: &ProvisionArgs) -> Result<(), CliError> {
    require_file(&args.file)?;
    let config = load_config(&args.workspace)?;

    let delimiter = delimiter_byte(config.ingest.delimiter)?;
    let encoding = resolve_encoding(&config.ingest.encoding)?;
    let batch = Batch::from_path(&args.file, delimiter, encoding)?;
    let plan = infer_plan(&batch, &config.ingest.numeric_columns);

    let rt = runtime()?;
    rt.block_on(async {
        let backend = connect(&config, &args.workspace).await?;
        let result = Provisioner::new(backend.as_ref(), config.reference.description_column.as_str())
            .provision(args.direction, &plan)
            .await;
        disconnect(backend.as_ref()).await;
        let outcome = result?;

        if args.json {
            return print_json(&outcome);
        }

        println!(
            "{}: {}",
            outcome.table,
            if outcome.created { "created" } else { "exists" }
        );
        for column in &outcome.plan.columns {
            println!("  {:<24} {}", column.name, column.column_type);
        }
        if !outcome.added_columns.is_empty() {
            println!("Added columns: {}", outcome.added_columns.join(", "));
        }
        match &outcome.constraint {
            ConstraintStatus::Present => println!("Natural key constraint: present"),
            ConstraintStatus::Added => println!("Natural key constraint: added"),
            ConstraintStatus::MissingKeyColumns(missing) => println!(
                "Natural key constraint: not added, missing {}",
                missing.join(", ")
            ),
            ConstraintStatus::Rejected(reason) => {
                println!("Natural key constraint: rejected ({})", reason)
            }
        }
        Ok(())
    })
}
