//! Configuration management
//!
//! Reads `settings.json` from the deltasync directory:
//! ```json
//! {
//!   "source": { "baseUrl": "https://api.example.com", "apiKey": null, "timeoutSecs": 30 },
//!   "store": { "database": "deltasync.duckdb" },
//!   "jobs": { "prices": { "endpoint": "/timeseries", ... } }
//! }
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::adapters::http::DEFAULT_TIMEOUT_SECS;
use crate::domain::result::Error;
use crate::domain::{MissingColumnPolicy, QueryParams, SyncJob};

/// Settings file name inside the deltasync directory
pub const SETTINGS_FILE: &str = "settings.json";

/// Database file used when `store.database` is not set
pub const DEFAULT_DATABASE: &str = "deltasync.duckdb";

pub const ENV_API_KEY: &str = "DELTASYNC_API_KEY";
pub const ENV_BASE_URL: &str = "DELTASYNC_BASE_URL";

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    source: SourceSettings,
    #[serde(default)]
    store: StoreSettings,
    #[serde(default)]
    jobs: BTreeMap<String, JobSettings>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SourceSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timeout_secs: Option<u64>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

impl fmt::Debug for SourceSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceSettings")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    database: Option<String>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// One job as written in settings.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSettings {
    pub endpoint: String,
    pub table: String,
    pub data_key: String,
    pub columns: Vec<String>,
    pub unique_column: String,
    #[serde(default)]
    pub params: QueryParams,
    #[serde(default)]
    pub missing_column: MissingColumnPolicy,
}

impl JobSettings {
    /// Validate into a runnable job
    pub fn to_job(&self, name: &str) -> crate::domain::result::Result<SyncJob> {
        Ok(SyncJob::new(
            name,
            self.endpoint.as_str(),
            &self.table,
            self.data_key.as_str(),
            self.columns.as_slice(),
            &self.unique_column,
        )?
        .with_params(self.params.clone())
        .with_missing_column(self.missing_column))
    }
}

/// Data source connection settings after env overrides
#[derive(Clone)]
pub struct SourceConfig {
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Deltasync configuration (resolved view of settings)
#[derive(Debug, Clone)]
pub struct Config {
    pub source: SourceConfig,
    /// Absolute path of the record store database
    pub database_path: PathBuf,
    jobs: BTreeMap<String, JobSettings>,
    // Keep the raw settings for preservation when saving
    raw: SettingsFile,
}

impl Config {
    /// Load config from the deltasync directory
    ///
    /// `DELTASYNC_API_KEY` and `DELTASYNC_BASE_URL` override the file.
    pub fn load(dir: &Path) -> Result<Self> {
        Self::load_with_env(dir, |name| std::env::var(name).ok())
    }

    /// Load with an explicit environment lookup
    pub fn load_with_env<F>(dir: &Path, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let raw = read_settings(dir)?;

        let base_url = env(ENV_BASE_URL)
            .filter(|v| !v.is_empty())
            .or_else(|| raw.source.base_url.clone());
        let api_key = env(ENV_API_KEY)
            .filter(|v| !v.is_empty())
            .or_else(|| raw.source.api_key.clone());
        let timeout_secs = raw.source.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            bail!("source.timeoutSecs in {} must be at least 1", SETTINGS_FILE);
        }
        let timeout = Duration::from_secs(timeout_secs);

        let database = raw.store.database.as_deref().unwrap_or(DEFAULT_DATABASE);
        let database_path = dir.join(database);

        Ok(Self {
            source: SourceConfig {
                base_url,
                api_key,
                timeout,
            },
            database_path,
            jobs: raw.jobs.clone(),
            raw,
        })
    }

    /// Save jobs back to the deltasync directory
    ///
    /// Preserves every other setting, including fields this crate does not
    /// know about. Env overrides are never written to disk.
    pub fn save(&self, dir: &Path) -> Result<()> {
        let settings_path = dir.join(SETTINGS_FILE);

        let mut settings = self.raw.clone();
        settings.jobs = self.jobs.clone();

        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(&settings_path, content)
            .with_context(|| format!("Failed to write {}", settings_path.display()))?;
        Ok(())
    }

    /// Look up and validate a job by name
    pub fn job(&self, name: &str) -> crate::domain::result::Result<SyncJob> {
        self.jobs
            .get(name)
            .ok_or_else(|| Error::config(format!("No job named '{}' in {}", name, SETTINGS_FILE)))?
            .to_job(name)
    }

    pub fn job_names(&self) -> Vec<&str> {
        self.jobs.keys().map(String::as_str).collect()
    }

    /// Raw job definitions, sorted by name
    pub fn job_settings(&self) -> impl Iterator<Item = (&str, &JobSettings)> {
        self.jobs.iter().map(|(name, job)| (name.as_str(), job))
    }

    /// Add or replace a job definition after validating it
    pub fn set_job(&mut self, name: &str, job: JobSettings) -> crate::domain::result::Result<()> {
        job.to_job(name)?;
        self.jobs.insert(name.to_string(), job);
        Ok(())
    }

    /// Drop a job definition; `false` when no job had that name
    pub fn remove_job(&mut self, name: &str) -> bool {
        self.jobs.remove(name).is_some()
    }
}

fn read_settings(dir: &Path) -> Result<SettingsFile> {
    let settings_path = dir.join(SETTINGS_FILE);
    if !settings_path.exists() {
        return Ok(SettingsFile::default());
    }
    let content = std::fs::read_to_string(&settings_path)
        .with_context(|| format!("Failed to read {}", settings_path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse {}", settings_path.display()))
}
