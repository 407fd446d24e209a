//! Deltasync CLI - incremental time-series ingestion from the terminal

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod output;

use commands::{init_table, jobs, logs, sync};

/// Environment variable holding the tracing filter
const LOG_ENV: &str = "DELTASYNC_LOG";

/// Deltasync - fetch only what your DuckDB table is missing
#[derive(Parser)]
#[command(name = "dsync", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch and store identifiers a job's table does not have yet
    Sync {
        /// Job name from settings.json
        job: String,
        /// Identifiers to sync (e.g. ticker symbols)
        #[arg(required = true)]
        identifiers: Vec<String>,
        /// Fetch and extract without writing
        #[arg(long)]
        dry_run: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List, add and remove jobs in settings.json
    Jobs {
        #[command(subcommand)]
        command: jobs::JobsCommands,
    },

    /// Create the target table of a job
    InitTable {
        /// Job name from settings.json
        job: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// View and manage the sync event log
    Logs {
        #[command(subcommand)]
        command: logs::LogsCommands,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let fmt_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    // A second init (tests, embedding) is harmless
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let result = run(cli);

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Sync {
            job,
            identifiers,
            dry_run,
            json,
        } => sync::run(&job, &identifiers, dry_run, json),
        Commands::Jobs { command } => jobs::run(command),
        Commands::InitTable { job, json } => init_table::run(&job, json),
        Commands::Logs { command } => logs::run(command),
    }
}
