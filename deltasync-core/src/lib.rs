//! Deltasync Core - incremental ingestion of time-series data into DuckDB
//!
//! This crate implements the sync engine following hexagonal architecture:
//!
//! - **domain**: Core types (SyncJob, Row, SyncReport, SqlIdent, etc.)
//! - **ports**: Trait definitions for external dependencies (DataSource, RecordStore, SyncObserver)
//! - **services**: The sync engine and its observers
//! - **adapters**: Concrete implementations (HTTP, DuckDB)

pub mod adapters;
pub mod config;
pub mod domain;
mod log_migrations;
pub mod ports;
pub mod services;

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use adapters::duckdb::DuckDbStore;
use adapters::http::HttpDataSource;
use config::Config;
use ports::{RecordStore, SyncObserver};
use services::{EventLog, Observers, SyncService, TracingObserver};

// Re-export commonly used types at crate root
pub use domain::result::Error;
pub use domain::{MissingColumnPolicy, SkipReason, SyncEvent, SyncJob, SyncReport};

/// Main context for deltasync operations
///
/// Wires configuration into the HTTP data source, the DuckDB store and the
/// event log, and builds sync services on top of them.
pub struct SyncContext {
    pub config: Config,
    pub source: Arc<HttpDataSource>,
    pub store: Arc<DuckDbStore>,
    pub event_log: Arc<EventLog>,
}

impl SyncContext {
    /// Create a new context from the deltasync directory
    pub fn new(dir: &Path) -> Result<Self> {
        let config = Config::load(dir)?;
        Self::from_config(dir, config)
    }

    pub fn from_config(dir: &Path, config: Config) -> Result<Self> {
        let base_url = config.source.base_url.as_deref().ok_or_else(|| {
            anyhow!(
                "No data source configured. Set source.baseUrl in {} or {}",
                config::SETTINGS_FILE,
                config::ENV_BASE_URL
            )
        })?;

        let source = Arc::new(HttpDataSource::with_timeout(
            base_url,
            config.source.api_key.as_deref(),
            config.source.timeout,
        )?);
        let store = Arc::new(DuckDbStore::open(&config.database_path)?);
        let event_log = Arc::new(EventLog::new(dir)?);

        Ok(Self {
            config,
            source,
            store,
            event_log,
        })
    }

    /// Sync service reporting to tracing and the event log
    pub fn sync_service(&self) -> SyncService {
        SyncService::new(self.source.clone(), self.store.clone())
            .with_observer(Arc::new(self.observers()))
    }

    /// Sync service that also reports to `observer`
    pub fn sync_service_with(&self, observer: Arc<dyn SyncObserver>) -> SyncService {
        SyncService::new(self.source.clone(), self.store.clone())
            .with_observer(Arc::new(self.observers().with(observer)))
    }

    fn observers(&self) -> Observers {
        Observers::new()
            .with(Arc::new(TracingObserver))
            .with(self.event_log.clone())
    }

    /// Run a configured job
    pub fn sync<S: AsRef<str>>(&self, job: &str, identifiers: &[S], dry_run: bool) -> Result<SyncReport> {
        run_job(&self.sync_service(), &self.config.job(job)?, identifiers, dry_run)
    }

    /// Release the store connection; later syncs fail with a store error
    pub fn close(&self) -> Result<()> {
        self.store.close()?;
        Ok(())
    }
}

/// Run `job` as a real or dry run
pub fn run_job<S: AsRef<str>>(
    service: &SyncService,
    job: &SyncJob,
    identifiers: &[S],
    dry_run: bool,
) -> Result<SyncReport> {
    let report = if dry_run {
        service.dry_run(job, identifiers)?
    } else {
        service.sync(job, identifiers)?
    };
    Ok(report)
}
