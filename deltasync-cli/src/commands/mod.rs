//! CLI command implementations

pub mod init_table;
pub mod jobs;
pub mod logs;
pub mod sync;

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use deltasync_core::config::Config;
use deltasync_core::SyncContext;
use tracing::debug;

/// Environment variable overriding the deltasync directory
const DIR_ENV: &str = "DELTASYNC_DIR";

/// Get the deltasync directory from environment or default
pub fn get_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(DIR_ENV) {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".deltasync"))
        .ok_or_else(|| anyhow!("Could not find home directory; set {}", DIR_ENV))
}

/// Get the deltasync directory, creating it if needed
pub fn ensure_data_dir() -> Result<PathBuf> {
    let dir = get_data_dir()?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create deltasync directory: {:?}", dir))?;
    Ok(dir)
}

/// Load configuration without opening any database
pub fn get_config() -> Result<Config> {
    let dir = get_data_dir()?;
    Config::load(&dir)
}

/// Get or create the full sync context
pub fn get_context() -> Result<SyncContext> {
    let dir = ensure_data_dir()?;
    debug!(dir = %dir.display(), "Opening deltasync context");
    SyncContext::new(&dir).context("Failed to initialize deltasync context")
}
