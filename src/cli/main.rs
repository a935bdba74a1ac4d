//! CLI binary entry point for comex

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};
#[cfg(feature = "cli")]
use comex_loader::cli::commands::backfill::{BackfillArgs, handle_backfill};
#[cfg(feature = "cli")]
use comex_loader::cli::commands::init::{InitArgs, handle_init};
#[cfg(feature = "cli")]
use comex_loader::cli::commands::load::{LoadArgs, handle_load};
#[cfg(feature = "cli")]
use comex_loader::cli::commands::provision::{ProvisionArgs, handle_provision};
#[cfg(feature = "cli")]
use comex_loader::cli::commands::status::{StatusArgs, handle_status};
#[cfg(feature = "cli")]
use comex_loader::ingest::Direction;
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "comex")]
#[command(about = "Load foreign-trade extracts without duplicates and backfill NCM labels")]
#[command(version)]
struct Cli {
    /// Log debug detail (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum Commands {
    /// Write a workspace configuration and check the store
    Init {
        /// Workspace path
        #[arg(default_value = ".")]
        workspace: PathBuf,
        /// Store backend (duckdb, postgres)
        #[arg(short, long, default_value = "duckdb")]
        backend: String,
        /// PostgreSQL connection string (required for postgres backend)
        #[arg(long)]
        connection_string: Option<String>,
        /// Overwrite an existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Create or extend a direction's table from a sample extract
    Provision {
        /// Direction: E (export) or I (import)
        direction: Direction,
        /// Sample extract file
        file: PathBuf,
        /// Workspace path
        #[arg(short, long, default_value = ".")]
        workspace: PathBuf,
        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },

    /// Load extracts, inserting only rows not yet stored
    Load {
        /// Direction: E (export) or I (import)
        direction: Direction,
        /// Extract files
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Workspace path
        #[arg(short, long, default_value = ".")]
        workspace: PathBuf,
        /// Clear the table before loading (destructive)
        #[arg(long)]
        replace: bool,
        /// Print reports as JSON
        #[arg(long)]
        json: bool,
    },

    /// Populate NCM labels from the reference file
    Backfill {
        /// NCM reference file
        reference: PathBuf,
        /// Target tables (default: export_data and import_data)
        #[arg(short, long)]
        table: Vec<String>,
        /// Workspace path
        #[arg(short, long, default_value = ".")]
        workspace: PathBuf,
        /// Print reports as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show row and label counts per table
    Status {
        /// Workspace path
        #[arg(default_value = ".")]
        workspace: PathBuf,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[cfg(feature = "cli")]
fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default = if verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(feature = "cli")]
fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Init {
            workspace,
            backend,
            connection_string,
            force,
        } => {
            let args = InitArgs {
                workspace,
                backend,
                connection_string,
                force,
            };
            handle_init(&args)?
        }
        Commands::Provision {
            direction,
            file,
            workspace,
            json,
        } => {
            let args = ProvisionArgs {
                workspace,
                direction,
                file,
                json,
            };
            handle_provision(&args)?
        }
        Commands::Load {
            direction,
            files,
            workspace,
            replace,
            json,
        } => {
            let args = LoadArgs {
                workspace,
                direction,
                files,
                replace,
                json,
            };
            handle_load(&args)?
        }
        Commands::Backfill {
            reference,
            table,
            workspace,
            json,
        } => {
            let args = BackfillArgs {
                workspace,
                reference,
                targets: table,
                json,
            };
            handle_backfill(&args)?
        }
        Commands::Status { workspace, json } => {
            let args = StatusArgs { workspace, json };
            handle_status(&args)?
        }
    }
    Ok(())
}

#[cfg(feature = "cli")]
fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature is not enabled. Build with --features cli");
    std::process::exit(1);
}
