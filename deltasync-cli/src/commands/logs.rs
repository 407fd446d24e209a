//! Logs command - view and manage the sync event log

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use deltasync_core::services::{EventEntry, EventLog};

use super::ensure_data_dir;
use crate::output;

#[derive(Subcommand)]
pub enum LogsCommands {
    /// Show recent events
    List {
        /// Number of entries to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Show only failures and skips
        #[arg(long)]
        errors: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Clear old events
    Clear {
        /// Delete events older than N days
        #[arg(long, default_value = "30")]
        older_than_days: u64,
        /// Skip confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show event log statistics and database path
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn get_event_log() -> Result<EventLog> {
    let dir = ensure_data_dir()?;
    EventLog::new(&dir)
}

fn format_timestamp(timestamp_ms: i64) -> String {
    use chrono::{TimeZone, Utc};
    Utc.timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| timestamp_ms.to_string())
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn print_entries(entries: Vec<EventEntry>) {
    let mut table = output::create_table();
    table.set_header(vec!["Time", "Run", "Job", "Event", "Identifier", "Rows", "Detail"]);

    for entry in entries {
        let detail = match entry.error_message {
            Some(error) => error.red().to_string(),
            None => entry.detail.unwrap_or_default(),
        };
        // Short run id is enough to tell runs apart on screen
        let run: String = entry.run_id.chars().take(8).collect();

        table.add_row(vec![
            format_timestamp(entry.timestamp),
            run,
            entry.job,
            entry.event,
            entry.identifier.unwrap_or_default(),
            entry.rows.map(|r| r.to_string()).unwrap_or_default(),
            detail,
        ]);
    }

    println!("{}", table);
}

pub fn run(command: LogsCommands) -> Result<()> {
    match command {
        LogsCommands::List { limit, errors, json } => {
            let log = get_event_log()?;
            let entries = if errors {
                log.get_errors(limit)?
            } else {
                log.get_recent(limit)?
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
                return Ok(());
            }

            if entries.is_empty() {
                println!("No events found.");
                return Ok(());
            }

            print_entries(entries);
        }
        LogsCommands::Clear {
            older_than_days,
            force,
            json,
        } => {
            let log = get_event_log()?;
            let cutoff_ms = now_ms() - (older_than_days as i64 * 24 * 60 * 60 * 1000);

            if !force && !json {
                use dialoguer::Confirm;
                if !Confirm::new()
                    .with_prompt(format!("Delete events older than {} days?", older_than_days))
                    .default(false)
                    .interact()?
                {
                    println!("Cancelled.");
                    return Ok(());
                }
            }

            let deleted = log.delete_before(cutoff_ms)?;

            if json {
                println!("{}", serde_json::json!({ "deleted": deleted }));
            } else {
                println!("Deleted {} events", deleted);
            }
        }
        LogsCommands::Stats { json } => {
            let log = get_event_log()?;
            let total = log.count()?;
            let errors = log.count_errors()?;
            let db_path = log.db_path().to_path_buf();
            let size_bytes = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);

            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "total_events": total,
                        "error_count": errors,
                        "database_path": db_path.to_string_lossy(),
                        "database_size_bytes": size_bytes
                    })
                );
            } else {
                println!("{}", "Event Log Statistics".bold());
                println!("  Total events: {}", total);
                println!("  Failures and skips: {}", errors);
                println!("  Database: {}", db_path.display());
                println!("  Size: {}", output::format_size(size_bytes));
            }
        }
    }

    Ok(())
}
