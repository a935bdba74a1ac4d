//! Extract loading command

use std::path::PathBuf;

use crate::cli::commands::{connect, disconnect, load_config, print_json, require_file, runtime};
use crate::cli::error::CliError;
use crate::ingest::{Direction, IngestReport, LoadMode, ingest_file};

/// Load command arguments
#[derive(Debug, Clone)]
pub struct LoadArgs {
    /// Workspace path
    pub workspace: PathBuf,
    /// Trade direction
    pub direction: Direction,
    /// Extract files, loaded in order
    pub files: Vec<PathBuf>,
    /// Clear the table before loading the first file
    pub replace: bool,
    /// Print reports as JSON
    pub json: bool,
}

/// Load one or more extracts into a direction's table
///
/// With `replace`, only the first file clears the table; the rest load
/// incrementally on top of it. The first failing file stops the run.
pub fn handle_load(args: &LoadArgs) -> Result<(), CliError> {
    if args.files.is_empty() {
        return Err(CliError::InvalidArgument("No files given".to_string()));
    }
    for file in &args.files {
        require_file(file)?;
    }
    let config = load_config(&args.workspace)?;

    let rt = runtime()?;
    rt.block_on(async {
        let backend = connect(&config, &args.workspace).await?;

        let mut reports: Vec<IngestReport> = Vec::with_capacity(args.files.len());
        let mut failure = None;
        for (i, file) in args.files.iter().enumerate() {
            let mode = if args.replace && i == 0 {
                LoadMode::Replace
            } else {
                LoadMode::Incremental
            };
            match ingest_file(backend.as_ref(), &config, file, args.direction, mode).await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    tracing::error!("Load of {} failed: {}", file.display(), e);
                    failure = Some(e);
                    break;
                }
            }
        }
        disconnect(backend.as_ref()).await;

        if args.json {
            print_json(&reports)?;
        } else {
            for report in &reports {
                print_report(report);
            }
        }

        match failure {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    })
}

fn print_report(report: &IngestReport) {
    let load = &report.load;
    let source = report
        .source
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    println!("{} -> {}", source, load.table);
    println!("  considered:          {}", load.rows_considered);
    println!("  rejected (parse):    {}", report.rows_rejected);
    println!("  already stored:      {}", load.rows_already_stored);
    println!("  duplicate in batch:  {}", load.rows_duplicate_in_batch);
    println!("  cells nulled:        {}", load.cells_nulled);
    println!("  inserted:            {}", load.rows_inserted);
    if load.replaced {
        println!("  (table cleared before load)");
    }
}
