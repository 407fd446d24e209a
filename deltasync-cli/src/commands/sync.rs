//! Sync command - fetch identifiers missing from a job's table

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use uuid::Uuid;

use deltasync_core::ports::SyncObserver;
use deltasync_core::{run_job, SyncEvent, SyncReport};

use super::get_context;
use crate::output;

/// Progress bar driven by sync events
struct ProgressObserver {
    bar: ProgressBar,
}

impl ProgressObserver {
    fn new(visible: bool) -> Self {
        let bar = if visible {
            ProgressBar::new(0)
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) =
            ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}")
        {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.enable_steady_tick(Duration::from_millis(120));
        Self { bar }
    }
}

impl SyncObserver for ProgressObserver {
    fn on_event(&self, _run_id: Uuid, _job: &str, event: &SyncEvent) {
        match event {
            SyncEvent::DeltaComputed { to_fetch, .. } => {
                self.bar.set_length(*to_fetch as u64);
            }
            SyncEvent::RowsWritten { identifier, .. }
            | SyncEvent::IdentifierSkipped { identifier, .. } => {
                self.bar.set_message(identifier.clone());
                self.bar.inc(1);
            }
            SyncEvent::RunFinished { .. } | SyncEvent::RunFailed { .. } => {
                self.bar.finish_and_clear();
            }
            _ => {}
        }
    }
}

pub fn run(job_name: &str, identifiers: &[String], dry_run: bool, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let job = ctx.config.job(job_name)?;

    let progress = Arc::new(ProgressObserver::new(!json));
    let service = ctx.sync_service_with(progress.clone());
    let result = run_job(&service, &job, identifiers, dry_run);
    progress.bar.finish_and_clear();
    let report = result?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_report(&report);
    Ok(())
}

fn print_report(report: &SyncReport) {
    if report.dry_run {
        output::warning("DRY RUN - No rows written");
        println!();
    }

    println!("{} {}", "Synced:".green(), report.job);
    output::field("Requested", report.requested);
    output::field("Already present", report.already_present);
    output::field("Fetched", format!("{} of {}", report.fetched, report.attempted));
    let rows_label = if report.dry_run { "Rows to write" } else { "Rows written" };
    output::field(rows_label, report.rows_written);
    if report.records_skipped > 0 {
        output::field("Records skipped", report.records_skipped);
    }

    if !report.skipped.is_empty() {
        println!();
        println!("{}", "Skipped identifiers:".yellow());
        let mut table = output::create_table();
        table.set_header(vec!["Identifier", "Reason", "Detail"]);
        for skipped in &report.skipped {
            table.add_row(vec![
                skipped.identifier.clone(),
                skipped.reason.to_string(),
                skipped.detail.clone().unwrap_or_default(),
            ]);
        }
        println!("{}", table);
    }

    if report.attempted == 0 {
        output::info("Nothing to fetch; every identifier is already stored.");
    }
}
