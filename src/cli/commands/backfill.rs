//! Descriptive-label backfill command

use std::path::PathBuf;

use crate::cli::commands::{connect, disconnect, load_config, print_json, require_file, runtime};
use crate::cli::error::CliError;
use crate::ingest::reader::resolve_encoding;
use crate::ingest::{BackfillStatus, Backfiller, Direction, ReferenceMapping};

/// Backfill command arguments
#[derive(Debug, Clone)]
pub struct BackfillArgs {
    /// Workspace path
    pub workspace: PathBuf,
    /// NCM reference file
    pub reference: PathBuf,
    /// Target tables (default: both trade tables)
    pub targets: Vec<String>,
    /// Print reports as JSON
    pub json: bool,
}

/// Populate the descriptive column of each target from the reference file
pub fn handle_backfill(args: &BackfillArgs) -> Result<(), CliError> {
    require_file(&args.reference)?;
    let config = load_config(&args.workspace)?;
    let reference = &config.reference;

    let encoding = resolve_encoding(&reference.encoding)?;
    let mapping = ReferenceMapping::from_path(
        &args.reference,
        encoding,
        &reference.code_column,
        &reference.label_column,
    )?;

    let targets: Vec<String> = if args.targets.is_empty() {
        Direction::ALL
            .iter()
            .map(|d| d.table_name().to_string())
            .collect()
    } else {
        args.targets.clone()
    };

    let rt = runtime()?;
    rt.block_on(async {
        let backend = connect(&config, &args.workspace).await?;
        let result = Backfiller::new(
            backend.as_ref(),
            reference.code_column.as_str(),
            reference.description_column.as_str(),
        )
        .backfill(&mapping, &targets)
        .await;
        disconnect(backend.as_ref()).await;
        let reports = result?;

        if args.json {
            print_json(&reports)?;
        } else {
            for report in &reports {
                match &report.status {
                    BackfillStatus::Updated => println!(
                        "{}: {} rows updated ({} codes skipped)",
                        report.table, report.rows_updated, report.codes_skipped
                    ),
                    BackfillStatus::Skipped(reason) => {
                        println!("{}: skipped, {}", report.table, reason)
                    }
                    BackfillStatus::Failed(message) => {
                        println!("{}: failed, {}", report.table, message)
                    }
                }
            }
        }

        let failed = reports
            .iter()
            .filter(|r| matches!(r.status, BackfillStatus::Failed(_)))
            .count();
        if failed > 0 {
            return Err(CliError::BackfillFailed(failed, reports.len()));
        }
        Ok(())
    })
}
