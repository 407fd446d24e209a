//! Init-table command - create a job's target table

use anyhow::{Context, Result};
use serde_json::json;

use deltasync_core::adapters::duckdb::DuckDbStore;
use deltasync_core::config::Config;
use deltasync_core::ports::RecordStore;

use super::ensure_data_dir;
use crate::output;

pub fn run(job_name: &str, json: bool) -> Result<()> {
    let dir = ensure_data_dir()?;
    let config = Config::load(&dir)?;
    let job = config.job(job_name)?;

    let store = DuckDbStore::open(&config.database_path)
        .with_context(|| format!("Failed to open {}", config.database_path.display()))?;
    store.ensure_table(&job)?;
    store.close()?;

    let insert_columns = job.insert_columns();
    let columns: Vec<&str> = insert_columns.iter().map(|c| c.as_str()).collect();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "job": job.name,
                "table": job.table.as_str(),
                "columns": columns,
                "database": config.database_path.to_string_lossy(),
            }))?
        );
    } else {
        output::success(&format!(
            "Table {} ready in {}",
            job.table,
            config.database_path.display()
        ));
        output::field("Columns", columns.join(", "));
    }

    Ok(())
}
