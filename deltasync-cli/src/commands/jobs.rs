//! Jobs command - list, add and remove sync jobs in settings.json

use anyhow::{anyhow, bail, Result};
use clap::{Subcommand, ValueEnum};
use serde_json::json;

use deltasync_core::config::{Config, JobSettings, SETTINGS_FILE};
use deltasync_core::domain::QueryParams;
use deltasync_core::MissingColumnPolicy;

use super::{ensure_data_dir, get_config};
use crate::output;

#[derive(Subcommand)]
pub enum JobsCommands {
    /// List configured jobs
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Add a job, or replace one with the same name
    Add {
        /// Job name
        name: String,
        /// Endpoint path appended to the source base URL
        #[arg(long)]
        endpoint: String,
        /// Target table
        #[arg(long)]
        table: String,
        /// Response field holding the timestamp to record mapping
        #[arg(long)]
        data_key: String,
        /// Record fields to store, comma separated
        #[arg(long, value_delimiter = ',', required = true)]
        columns: Vec<String>,
        /// Column holding the identifier
        #[arg(long)]
        unique_column: String,
        /// Extra query parameter sent with every request (key=value)
        #[arg(long = "param", value_parser = parse_param)]
        params: Vec<(String, String)>,
        /// What to do when a record lacks a column
        #[arg(long, value_enum, default_value_t = MissingColumnArg::Abort)]
        missing_column: MissingColumnArg,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove a job
    Remove {
        /// Job name
        name: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum MissingColumnArg {
    Abort,
    SkipRecord,
    SkipIdentifier,
}

impl From<MissingColumnArg> for MissingColumnPolicy {
    fn from(arg: MissingColumnArg) -> Self {
        match arg {
            MissingColumnArg::Abort => MissingColumnPolicy::Abort,
            MissingColumnArg::SkipRecord => MissingColumnPolicy::SkipRecord,
            MissingColumnArg::SkipIdentifier => MissingColumnPolicy::SkipIdentifier,
        }
    }
}

fn parse_param(s: &str) -> Result<(String, String)> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| anyhow!("expected key=value, got '{}'", s))?;
    if key.is_empty() {
        bail!("parameter name is empty in '{}'", s);
    }
    Ok((key.to_string(), value.to_string()))
}

pub fn run(command: JobsCommands) -> Result<()> {
    match command {
        JobsCommands::List { json } => list(json),
        JobsCommands::Add {
            name,
            endpoint,
            table,
            data_key,
            columns,
            unique_column,
            params,
            missing_column,
            json,
        } => {
            let job = JobSettings {
                endpoint,
                table,
                data_key,
                columns,
                unique_column,
                params: params.into_iter().collect::<QueryParams>(),
                missing_column: missing_column.into(),
            };
            add(&name, job, json)
        }
        JobsCommands::Remove { name, json } => remove(&name, json),
    }
}

fn list(json: bool) -> Result<()> {
    let config = get_config()?;

    if json {
        let jobs: serde_json::Map<String, serde_json::Value> = config
            .job_settings()
            .map(|(name, job)| Ok((name.to_string(), serde_json::to_value(job)?)))
            .collect::<Result<_>>()?;
        println!("{}", serde_json::to_string_pretty(&json!({ "jobs": jobs }))?);
        return Ok(());
    }

    let mut jobs = config.job_settings().peekable();
    if jobs.peek().is_none() {
        output::warning("No jobs configured. Add one with `dsync jobs add`.");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec!["Job", "Endpoint", "Table", "Unique", "Columns", "Missing column"]);
    for (name, job) in jobs {
        table.add_row(vec![
            name.to_string(),
            job.endpoint.clone(),
            job.table.clone(),
            job.unique_column.clone(),
            job.columns.join(", "),
            job.missing_column.as_str().to_string(),
        ]);
    }
    println!("{}", table);

    Ok(())
}

fn add(name: &str, job: JobSettings, json: bool) -> Result<()> {
    let dir = ensure_data_dir()?;
    let mut config = Config::load(&dir)?;
    let replaced = config.job_names().contains(&name);

    config.set_job(name, job.clone())?;
    config.save(&dir)?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "job": name,
                "replaced": replaced,
                "settings": job,
            }))?
        );
    } else {
        let verb = if replaced { "Updated" } else { "Added" };
        output::success(&format!("{} job {} in {}", verb, name, SETTINGS_FILE));
        output::field("Table", &job.table);
        output::field("Columns", job.columns.join(", "));
        output::info(&format!("Run `dsync init-table {}` to create the table", name));
    }

    Ok(())
}

fn remove(name: &str, json: bool) -> Result<()> {
    let dir = ensure_data_dir()?;
    let mut config = Config::load(&dir)?;

    if !config.remove_job(name) {
        bail!("No job named '{}' in {}", name, SETTINGS_FILE);
    }
    config.save(&dir)?;

    if json {
        println!("{}", json!({ "removed": name }));
    } else {
        // The table and its rows stay in the database
        output::success(&format!("Removed job {}", name));
    }

    Ok(())
}
