//! DuckDB record store implementation

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use duckdb::types::{Value, ValueRef};
use duckdb::{Connection, ToSql};
use serde_json::Value as JsonValue;
use sqlparser::dialect::DuckDbDialect;
use sqlparser::parser::Parser;
use tracing::{debug, warn};

use crate::domain::result::{Error, Result};
use crate::domain::SyncJob;
use crate::ports::RecordStore;

impl From<duckdb::Error> for Error {
    fn from(e: duckdb::Error) -> Self {
        Error::Store(e.to_string())
    }
}

/// Validate SQL syntax before execution to catch malformed statements early.
fn validate_sql_syntax(sql: &str) -> Result<()> {
    let dialect = DuckDbDialect {};
    Parser::parse_sql(&dialect, sql).map_err(|e| {
        let msg = e.to_string();
        let cleaned = msg.trim_start_matches("sql parser error: ");
        Error::store(format!("Invalid SQL: {}", cleaned))
    })?;
    Ok(())
}

/// Maximum number of attempts when the database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
}

/// Open a database file with extension autoloading disabled
///
/// Shared by the record store and the event log. Lock contention from
/// another process is retried with exponential backoff.
pub(crate) fn open_connection(db_path: &Path) -> Result<Connection> {
    let mut last_error = None;

    for attempt in 0..MAX_RETRIES {
        match try_open_connection(db_path) {
            Ok(conn) => return Ok(conn),
            Err(e) => {
                let err_msg = e.to_string();
                if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                    let delay = Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                    warn!(
                        path = %db_path.display(),
                        delay_ms = delay.as_millis() as u64,
                        attempt = attempt + 1,
                        max = MAX_RETRIES,
                        error = %err_msg,
                        "Database busy, retrying"
                    );
                    thread::sleep(delay);
                    last_error = Some(e);
                    continue;
                }
                return Err(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| {
        Error::store(format!("Failed to open database after {} retries", MAX_RETRIES))
    }))
}

fn try_open_connection(db_path: &Path) -> Result<Connection> {
    // Cached extensions may not be signed for this binary; never autoload
    let config = duckdb::Config::default().enable_autoload_extension(false)?;
    let conn = Connection::open_with_flags(db_path, config)?;
    Ok(conn)
}

/// DuckDB-backed record store
///
/// Holds a single connection for its whole lifetime. Statements run in
/// autocommit mode, so every write is committed before `write` returns.
pub struct DuckDbStore {
    conn: Mutex<Option<Connection>>,
    db_path: Option<PathBuf>,
}

impl DuckDbStore {
    /// Open (or create) a database file
    ///
    /// Retries with exponential backoff when the file is locked by another
    /// process; any other error is returned immediately.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = open_connection(db_path)?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            db_path: Some(db_path.to_path_buf()),
        })
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        let conn = Connection::open_in_memory_with_flags(config)?;
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            db_path: None,
        })
    }

    /// Path of the database file, `None` for in-memory stores
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Create the target table of a job if it does not exist
    ///
    /// Every column is created as VARCHAR. The sync engine never calls this;
    /// it is for bootstrapping a fresh database.
    pub fn ensure_table(&self, job: &SyncJob) -> Result<()> {
        let columns = job
            .insert_columns()
            .iter()
            .map(|c| format!("{} VARCHAR", c.quoted()))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            job.table.quoted(),
            columns
        );
        self.execute_batch(&sql)
    }

    /// Run raw SQL with no parameters (DDL, fixtures)
    pub fn execute_batch(&self, sql: &str) -> Result<()> {
        let guard = self.lock()?;
        let conn = guard.as_ref().ok_or_else(closed)?;
        conn.execute_batch(sql)?;
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Option<Connection>>> {
        self.conn
            .lock()
            .map_err(|e| Error::store(format!("Lock poisoned: {}", e)))
    }

    /// Convert JSON value to DuckDB parameter
    fn json_to_duckdb_param(value: &JsonValue) -> Box<dyn ToSql> {
        match value {
            JsonValue::Null => Box::new(None::<String>),
            JsonValue::Bool(b) => Box::new(*b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Box::new(i)
                } else if let Some(f) = n.as_f64() {
                    Box::new(f)
                } else {
                    Box::new(n.to_string())
                }
            }
            JsonValue::String(s) => Box::new(s.clone()),
            // Nested values are stored as their JSON text
            JsonValue::Array(_) | JsonValue::Object(_) => Box::new(value.to_string()),
        }
    }

    fn get_column_value(row: &duckdb::Row, idx: usize) -> JsonValue {
        match row.get_ref(idx) {
            Ok(ValueRef::Text(bytes)) => {
                JsonValue::String(String::from_utf8_lossy(bytes).to_string())
            }
            // Enum labels come back as text, not as their dictionary index
            Ok(value @ ValueRef::Enum(..)) => match value.as_str() {
                Ok(label) => JsonValue::String(label.to_string()),
                Err(_) => JsonValue::Null,
            },
            Ok(value) => value_to_json(value.to_owned()),
            Err(_) => JsonValue::Null,
        }
    }
}

/// Convert an owned DuckDB value to JSON, recursing into nested types
fn value_to_json(value: Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Boolean(b) => JsonValue::Bool(b),
        Value::TinyInt(i) => serde_json::json!(i),
        Value::SmallInt(i) => serde_json::json!(i),
        Value::Int(i) => serde_json::json!(i),
        Value::BigInt(i) => serde_json::json!(i),
        Value::HugeInt(i) => serde_json::json!(i.to_string()),
        Value::UTinyInt(i) => serde_json::json!(i),
        Value::USmallInt(i) => serde_json::json!(i),
        Value::UInt(i) => serde_json::json!(i),
        Value::UBigInt(i) => serde_json::json!(i),
        Value::Float(f) => serde_json::json!(f),
        Value::Double(f) => serde_json::json!(f),
        Value::Decimal(d) => {
            let s = d.to_string();
            match s.parse::<f64>() {
                Ok(f) => serde_json::json!(f),
                Err(_) => JsonValue::String(s),
            }
        }
        Value::Text(s) | Value::Enum(s) => JsonValue::String(s),
        Value::Blob(bytes) => JsonValue::String(format!("<blob {} bytes>", bytes.len())),
        Value::Date32(d) => {
            // Days since epoch
            let date = chrono::NaiveDate::from_ymd_opt(1970, 1, 1)
                .map(|epoch| epoch + chrono::Duration::days(d as i64));
            match date {
                Some(date) => JsonValue::String(date.to_string()),
                None => serde_json::json!(d),
            }
        }
        Value::Timestamp(unit, ts) => {
            let micros = unit.to_micros(ts);
            let dt = chrono::DateTime::from_timestamp_micros(micros)
                .map(|dt| dt.to_rfc3339())
                .unwrap_or_else(|| micros.to_string());
            JsonValue::String(dt)
        }
        // Microseconds since midnight
        Value::Time64(unit, t) => serde_json::json!(unit.to_micros(t)),
        Value::Interval {
            months,
            days,
            nanos,
        } => serde_json::json!({
            "months": months,
            "days": days,
            "nanos": nanos
        }),
        Value::List(items) | Value::Array(items) => {
            JsonValue::Array(items.into_iter().map(value_to_json).collect())
        }
        Value::Struct(fields) => JsonValue::Object(
            fields
                .iter()
                .map(|(name, v)| (name.clone(), value_to_json(v.clone())))
                .collect(),
        ),
        Value::Map(entries) => JsonValue::Object(
            entries
                .iter()
                .map(|(k, v)| {
                    let key = match value_to_json(k.clone()) {
                        JsonValue::String(s) => s,
                        other => other.to_string(),
                    };
                    (key, value_to_json(v.clone()))
                })
                .collect(),
        ),
        Value::Union(inner) => value_to_json(*inner),
    }
}

fn closed() -> Error {
    Error::store("store is closed")
}

impl RecordStore for DuckDbStore {
    fn read_all(&self, sql: &str, params: &[JsonValue]) -> Result<Vec<Vec<JsonValue>>> {
        validate_sql_syntax(sql)?;

        let guard = self.lock()?;
        let conn = guard.as_ref().ok_or_else(closed)?;

        let duckdb_params: Vec<Box<dyn ToSql>> =
            params.iter().map(Self::json_to_duckdb_param).collect();
        let param_refs: Vec<&dyn ToSql> = duckdb_params.iter().map(|b| b.as_ref()).collect();

        let mut stmt = conn.prepare(sql)?;
        let mut result_rows = stmt.query(param_refs.as_slice())?;

        let mut rows: Vec<Vec<JsonValue>> = Vec::new();
        let mut column_count = 0;
        while let Some(row) = result_rows.next()? {
            if rows.is_empty() {
                column_count = row.as_ref().column_count();
            }
            rows.push(
                (0..column_count)
                    .map(|i| Self::get_column_value(row, i))
                    .collect(),
            );
        }

        debug!(rows = rows.len(), "Read statement executed");
        Ok(rows)
    }

    fn write(&self, sql: &str, params: &[JsonValue]) -> Result<usize> {
        validate_sql_syntax(sql)?;

        let guard = self.lock()?;
        let conn = guard.as_ref().ok_or_else(closed)?;

        let duckdb_params: Vec<Box<dyn ToSql>> =
            params.iter().map(Self::json_to_duckdb_param).collect();
        let param_refs: Vec<&dyn ToSql> = duckdb_params.iter().map(|b| b.as_ref()).collect();

        let mut stmt = conn.prepare(sql)?;
        let affected = stmt.execute(param_refs.as_slice())?;
        Ok(affected)
    }

    fn close(&self) -> Result<()> {
        let mut guard = self.lock()?;
        if let Some(conn) = guard.take() {
            conn.close().map_err(|(_, e)| Error::from(e))?;
        }
        Ok(())
    }
}
