//! Event log - sync history persisted to DuckDB
//!
//! Every event a sync run emits is stored in `events.duckdb` next to the
//! settings file. Only identifiers, counts and error text are recorded;
//! fetched values and credentials never are.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Result};
use duckdb::Connection;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::adapters::duckdb::open_connection;
use crate::domain::SyncEvent;
use crate::log_migrations::LOG_MIGRATIONS;
use crate::ports::SyncObserver;

/// File name of the event database inside the deltasync directory
pub const EVENT_LOG_FILE: &str = "events.duckdb";

/// Counter for generating unique IDs within the same millisecond
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a unique ID based on timestamp + counter
fn generate_id() -> u64 {
    // Lower 48 bits: timestamp, upper 16 bits: counter
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed) & 0xFFFF;
    ((now_ms() as u64) << 16) | counter
}

/// Current unix timestamp in milliseconds
fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// An event as stored in the database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEntry {
    pub id: u64,
    pub timestamp: i64,
    pub run_id: String,
    pub job: String,
    pub event: String,
    pub identifier: Option<String>,
    pub rows: Option<i64>,
    pub detail: Option<String>,
    pub error_message: Option<String>,
}

const SELECT_COLUMNS: &str =
    "id, timestamp, run_id, job, event, identifier, rows, detail, error_message";

/// Failed runs and skipped identifiers or records
const ERRORS_FILTER: &str =
    "WHERE error_message IS NOT NULL OR event IN ('identifier_skipped', 'record_skipped')";

/// Persistent sync event history
pub struct EventLog {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl EventLog {
    /// Open or create `events.duckdb` in `dir` and run pending migrations
    pub fn new(dir: &Path) -> Result<Self> {
        Self::open(&dir.join(EVENT_LOG_FILE))
    }

    /// Open or create an event database at `db_path`
    ///
    /// Uses the same connection settings and lock retry as the record store.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = open_connection(db_path)?;
        let log = Self {
            conn: Mutex::new(conn),
            db_path: db_path.to_path_buf(),
        };
        log.run_migrations()?;
        Ok(log)
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))?;

        let table_exists: bool = conn
            .query_row(
                "SELECT COUNT(*) > 0 FROM information_schema.tables WHERE table_name = 'sys_migrations'",
                [],
                |row| row.get(0),
            )
            .unwrap_or(false);

        // Bootstrap migrations table if needed
        if !table_exists {
            if let Some((name, sql)) = LOG_MIGRATIONS.first() {
                conn.execute_batch(sql)?;
                conn.execute(
                    "INSERT INTO sys_migrations (migration_name) VALUES (?)",
                    [name],
                )?;
            }
        }

        let mut stmt = conn.prepare("SELECT migration_name FROM sys_migrations")?;
        let applied: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .filter_map(|r| r.ok())
            .collect();

        for (name, sql) in LOG_MIGRATIONS.iter().skip(1) {
            if !applied.iter().any(|a| a == name) {
                conn.execute_batch(sql)?;
                conn.execute(
                    "INSERT INTO sys_migrations (migration_name) VALUES (?)",
                    [name],
                )?;
            }
        }

        Ok(())
    }

    /// Record one sync event
    pub fn record(&self, run_id: Uuid, job: &str, event: &SyncEvent) -> Result<()> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))?;

        conn.execute(
            r#"
            INSERT INTO sync_events (
                id, timestamp, run_id, job, event, identifier, rows, detail, error_message
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            duckdb::params![
                generate_id(),
                now_ms(),
                run_id.to_string(),
                job,
                event.kind(),
                event.identifier(),
                event.rows().map(|r| r as i64),
                event.detail(),
                event.error(),
            ],
        )?;

        Ok(())
    }

    fn query(&self, filter: &str, limit: usize) -> Result<Vec<EventEntry>> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))?;

        let sql = format!(
            "SELECT {} FROM sync_events {} ORDER BY timestamp DESC, id DESC LIMIT ?",
            SELECT_COLUMNS, filter
        );
        let mut stmt = conn.prepare(&sql)?;

        let entries = stmt
            .query_map([limit as i64], |row| {
                Ok(EventEntry {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    run_id: row.get(2)?,
                    job: row.get(3)?,
                    event: row.get(4)?,
                    identifier: row.get(5)?,
                    rows: row.get(6)?,
                    detail: row.get(7)?,
                    error_message: row.get(8)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(entries)
    }

    /// Most recent events, newest first
    pub fn get_recent(&self, limit: usize) -> Result<Vec<EventEntry>> {
        self.query("", limit)
    }

    /// Failed runs and skipped identifiers, newest first
    pub fn get_errors(&self, limit: usize) -> Result<Vec<EventEntry>> {
        self.query(ERRORS_FILTER, limit)
    }

    /// Number of failures and skips, without a limit
    pub fn count_errors(&self) -> Result<u64> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))?;
        let sql = format!("SELECT COUNT(*) FROM sync_events {}", ERRORS_FILTER);
        let count: u64 = conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(count)
    }

    /// Every event of one run, oldest first
    pub fn get_run(&self, run_id: Uuid) -> Result<Vec<EventEntry>> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))?;

        let sql = format!(
            "SELECT {} FROM sync_events WHERE run_id = ? ORDER BY timestamp, id",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let entries = stmt
            .query_map([run_id.to_string()], |row| {
                Ok(EventEntry {
                    id: row.get(0)?,
                    timestamp: row.get(1)?,
                    run_id: row.get(2)?,
                    job: row.get(3)?,
                    event: row.get(4)?,
                    identifier: row.get(5)?,
                    rows: row.get(6)?,
                    detail: row.get(7)?,
                    error_message: row.get(8)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();

        Ok(entries)
    }

    /// Total number of stored events
    pub fn count(&self) -> Result<u64> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))?;
        let count: u64 = conn.query_row("SELECT COUNT(*) FROM sync_events", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Delete events older than the given timestamp (unix ms)
    pub fn delete_before(&self, timestamp_ms: i64) -> Result<u64> {
        let conn = self.conn.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))?;
        let deleted = conn.execute("DELETE FROM sync_events WHERE timestamp < ?", [timestamp_ms])?;
        Ok(deleted as u64)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

impl SyncObserver for EventLog {
    fn on_event(&self, run_id: Uuid, job: &str, event: &SyncEvent) {
        // A broken log must not break the sync
        if let Err(e) = self.record(run_id, job, event) {
            warn!(error = %e, event = event.kind(), "Failed to record sync event");
        }
    }
}
