//! Integration tests for the sync engine
//!
//! These tests verify dedup and persistence scenarios using real DuckDB.
//! Network IO is mocked at the trait level, but all database operations are real.
//!
//! Run with: cargo test --test sync_integration_tests -- --nocapture

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::{json, Value as JsonValue};
use tempfile::TempDir;

use deltasync_core::adapters::duckdb::DuckDbStore;
use deltasync_core::config::{Config, SETTINGS_FILE};
use deltasync_core::domain::result::Result;
use deltasync_core::domain::{QueryParams, SyncJob};
use deltasync_core::ports::{DataSource, RecordStore};
use deltasync_core::services::{CollectingObserver, EventLog, SyncService};
use deltasync_core::{Error, MissingColumnPolicy, SkipReason, SyncContext, SyncEvent};

// ============================================================================
// Test Helpers
// ============================================================================

/// Data source answering from a fixed map keyed by the `symbol` parameter
#[derive(Default)]
struct StaticSource {
    payloads: HashMap<String, JsonValue>,
    requested: Mutex<Vec<String>>,
}

impl StaticSource {
    fn with(mut self, symbol: &str, payload: JsonValue) -> Self {
        self.payloads.insert(symbol.to_string(), payload);
        self
    }

    fn requested(&self) -> Vec<String> {
        self.requested.lock().unwrap().clone()
    }
}

impl DataSource for StaticSource {
    fn name(&self) -> &str {
        "static"
    }

    fn fetch(&self, _endpoint: &str, params: &QueryParams) -> Result<Option<JsonValue>> {
        let symbol = params.get("symbol").cloned().unwrap_or_default();
        self.requested.lock().unwrap().push(symbol.clone());
        Ok(self.payloads.get(&symbol).cloned())
    }
}

fn prices_job() -> SyncJob {
    SyncJob::new("prices", "/timeseries", "prices", "data", &["open", "close"], "symbol").unwrap()
}

/// Open a file-backed store with the prices table created
fn create_test_store(temp_dir: &TempDir) -> Arc<DuckDbStore> {
    let store = DuckDbStore::open(&temp_dir.path().join("test.duckdb")).unwrap();
    store.ensure_table(&prices_job()).unwrap();
    Arc::new(store)
}

fn count_rows(store: &DuckDbStore, symbol: &str) -> i64 {
    let rows = store
        .read_all("SELECT COUNT(*) FROM prices WHERE symbol = ?", &[json!(symbol)])
        .unwrap();
    rows[0][0].as_i64().unwrap()
}

fn series(records: &[(&str, &str, &str)]) -> JsonValue {
    let mut data = serde_json::Map::new();
    for (ts, open, close) in records {
        data.insert(ts.to_string(), json!({"open": open, "close": close}));
    }
    json!({ "data": data })
}

// ============================================================================
// Dedup Tests
// ============================================================================

#[test]
fn test_existing_identifier_is_not_fetched_again() {
    let temp_dir = TempDir::new().unwrap();
    let store = create_test_store(&temp_dir);
    store
        .write(
            "INSERT INTO prices VALUES (?, ?, ?, ?)",
            &[json!("AAPL"), json!("1"), json!("2"), json!("2024-01-01")],
        )
        .unwrap();

    let source = Arc::new(
        StaticSource::default()
            .with("AAPL", series(&[("2024-01-02", "9", "9")]))
            .with("MSFT", series(&[("2024-01-01", "10", "11"), ("2024-01-02", "11", "12")])),
    );
    let service = SyncService::new(source.clone(), store.clone());

    let report = service.sync(&prices_job(), &["AAPL", "MSFT"]).unwrap();

    assert_eq!(source.requested(), vec!["MSFT"]);
    assert_eq!(report.already_present, 1);
    assert_eq!(report.rows_written, 2);
    assert_eq!(count_rows(&store, "AAPL"), 1);
    assert_eq!(count_rows(&store, "MSFT"), 2);

    let rows = store
        .read_all(
            "SELECT symbol, open, close, latest_date FROM prices WHERE symbol = ? ORDER BY latest_date",
            &[json!("MSFT")],
        )
        .unwrap();
    assert_eq!(
        rows[0],
        vec![json!("MSFT"), json!("10"), json!("11"), json!("2024-01-01")]
    );
}

#[test]
fn test_second_run_writes_nothing() {
    let temp_dir = TempDir::new().unwrap();
    let store = create_test_store(&temp_dir);
    let source = Arc::new(
        StaticSource::default()
            .with("A", series(&[("t1", "1", "2")]))
            .with("B", series(&[("t1", "3", "4"), ("t2", "5", "6")])),
    );
    let service = SyncService::new(source.clone(), store.clone());

    let first = service.sync(&prices_job(), &["A", "B"]).unwrap();
    assert_eq!(first.rows_written, 3);

    let second = service.sync(&prices_job(), &["A", "B"]).unwrap();
    assert_eq!(second.rows_written, 0);
    assert_eq!(second.attempted, 0);
    assert_eq!(second.already_present, 2);

    // Only the first run reached the source
    assert_eq!(source.requested(), vec!["A", "B"]);
}

#[test]
fn test_unknown_identifier_leaves_store_untouched() {
    let temp_dir = TempDir::new().unwrap();
    let store = create_test_store(&temp_dir);
    let service = SyncService::new(Arc::new(StaticSource::default()), store.clone());

    let report = service.sync(&prices_job(), &["GHOST"]).unwrap();

    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].reason, SkipReason::NoData);
    assert_eq!(count_rows(&store, "GHOST"), 0);
}

#[test]
fn test_typed_unique_columns_dedup_against_text_identifiers() {
    let cases = [
        ("DOUBLE", "CREATE TABLE prices (symbol DOUBLE, open VARCHAR, close VARCHAR, latest_date VARCHAR)"),
        ("DECIMAL", "CREATE TABLE prices (symbol DECIMAL(10, 2), open VARCHAR, close VARCHAR, latest_date VARCHAR)"),
        ("ENUM", "CREATE TYPE ticker AS ENUM ('42', '43'); \
                  CREATE TABLE prices (symbol ticker, open VARCHAR, close VARCHAR, latest_date VARCHAR)"),
    ];

    for (kind, ddl) in cases {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(DuckDbStore::open(&temp_dir.path().join("typed.duckdb")).unwrap());
        store.execute_batch(ddl).unwrap();
        store
            .execute_batch("INSERT INTO prices VALUES ('42', '1', '2', '2024-01-01')")
            .unwrap();

        let source = Arc::new(StaticSource::default().with("42", series(&[("t2", "3", "4")])));
        let service = SyncService::new(source.clone(), store.clone());

        let report = service.sync(&prices_job(), &["42"]).unwrap();

        assert_eq!(report.already_present, 1, "{} column", kind);
        assert_eq!(report.rows_written, 0, "{} column", kind);
        assert!(source.requested().is_empty(), "{} column refetched", kind);
    }
}

// ============================================================================
// Failure Tests
// ============================================================================

#[test]
fn test_missing_table_fails_before_fetching() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(DuckDbStore::open(&temp_dir.path().join("empty.duckdb")).unwrap());
    let source = Arc::new(StaticSource::default().with("A", series(&[("t1", "1", "2")])));
    let service = SyncService::new(source.clone(), store);

    let err = service.sync(&prices_job(), &["A"]).unwrap_err();

    assert!(matches!(err, Error::Store(_)));
    assert!(source.requested().is_empty());
}

#[test]
fn test_abort_policy_persists_no_partial_identifier() {
    let temp_dir = TempDir::new().unwrap();
    let store = create_test_store(&temp_dir);
    let source = Arc::new(
        StaticSource::default()
            .with("GOOD", series(&[("t1", "1", "2")]))
            .with(
                "BROKEN",
                json!({"data": {"t1": {"open": "1", "close": "2"}, "t2": {"open": "3"}}}),
            ),
    );
    let observer = Arc::new(CollectingObserver::new());
    let service = SyncService::new(source, store.clone()).with_observer(observer.clone());

    let err = service.sync(&prices_job(), &["GOOD", "BROKEN"]).unwrap_err();

    assert!(matches!(err, Error::Extraction { .. }));
    assert_eq!(count_rows(&store, "GOOD"), 1);
    assert_eq!(count_rows(&store, "BROKEN"), 0);
    assert!(matches!(
        observer.events().last(),
        Some(SyncEvent::RunFailed { .. })
    ));
}

#[test]
fn test_skip_record_policy_keeps_complete_records() {
    let temp_dir = TempDir::new().unwrap();
    let store = create_test_store(&temp_dir);
    let source = Arc::new(StaticSource::default().with(
        "X",
        json!({"data": {"t1": {"open": "1", "close": "2"}, "t2": {"close": "3"}}}),
    ));
    let service = SyncService::new(source, store.clone());
    let job = prices_job().with_missing_column(MissingColumnPolicy::SkipRecord);

    let report = service.sync(&job, &["X"]).unwrap();

    assert_eq!(report.records_skipped, 1);
    assert_eq!(count_rows(&store, "X"), 1);
}

#[test]
fn test_closed_store_rejects_sync() {
    let temp_dir = TempDir::new().unwrap();
    let store = create_test_store(&temp_dir);
    let service = SyncService::new(Arc::new(StaticSource::default()), store.clone());

    store.close().unwrap();
    // Closing twice is fine
    store.close().unwrap();

    let err = service.sync(&prices_job(), &["A"]).unwrap_err();
    assert!(err.to_string().contains("closed"));
}

// ============================================================================
// Persistence Tests
// ============================================================================

#[test]
fn test_rows_survive_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.duckdb");
    {
        let store = Arc::new(DuckDbStore::open(&db_path).unwrap());
        store.ensure_table(&prices_job()).unwrap();
        let source = Arc::new(StaticSource::default().with("A", series(&[("t1", "1", "2")])));
        SyncService::new(source, store.clone())
            .sync(&prices_job(), &["A"])
            .unwrap();
        store.close().unwrap();
    }

    let store = Arc::new(DuckDbStore::open(&db_path).unwrap());
    let source = Arc::new(StaticSource::default());
    let report = SyncService::new(source.clone(), store)
        .sync(&prices_job(), &["A"])
        .unwrap();

    assert_eq!(report.already_present, 1);
    assert!(source.requested().is_empty());
}

#[test]
fn test_dry_run_against_real_store() {
    let temp_dir = TempDir::new().unwrap();
    let store = create_test_store(&temp_dir);
    let source = Arc::new(StaticSource::default().with("A", series(&[("t1", "1", "2")])));
    let service = SyncService::new(source, store.clone());

    let report = service.dry_run(&prices_job(), &["A"]).unwrap();

    assert_eq!(report.rows_written, 1);
    assert_eq!(count_rows(&store, "A"), 0);
}

// ============================================================================
// Context Wiring Tests
// ============================================================================

#[test]
fn test_context_records_events_to_event_log() {
    let temp_dir = TempDir::new().unwrap();
    // Port nobody listens on: every fetch is a transport failure
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    std::fs::write(
        temp_dir.path().join(SETTINGS_FILE),
        format!(
            r#"{{
                "source": {{ "baseUrl": "http://127.0.0.1:{}", "timeoutSecs": 2 }},
                "jobs": {{
                    "prices": {{
                        "endpoint": "/timeseries", "table": "prices", "dataKey": "data",
                        "columns": ["open", "close"], "uniqueColumn": "symbol"
                    }}
                }}
            }}"#,
            port
        ),
    )
    .unwrap();

    let config = Config::load_with_env(temp_dir.path(), |_| None).unwrap();
    let ctx = SyncContext::from_config(temp_dir.path(), config).unwrap();
    ctx.store.ensure_table(&ctx.config.job("prices").unwrap()).unwrap();

    let report = ctx.sync("prices", &["A", "B"], false).unwrap();
    assert_eq!(report.skipped.len(), 2);
    assert!(report
        .skipped
        .iter()
        .all(|s| s.reason == SkipReason::Transport));

    let events = ctx.event_log.get_run(report.run_id).unwrap();
    let kinds: Vec<&str> = events.iter().map(|e| e.event.as_str()).collect();
    assert_eq!(
        kinds,
        vec![
            "run_started",
            "delta_computed",
            "identifier_skipped",
            "identifier_skipped",
            "run_finished"
        ]
    );

    // Reopening the log sees the same history
    drop(ctx);
    let log = EventLog::new(temp_dir.path()).unwrap();
    assert_eq!(log.count().unwrap(), 5);
}

#[test]
fn test_context_requires_base_url() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config::load_with_env(temp_dir.path(), |_| None).unwrap();
    let result = SyncContext::from_config(temp_dir.path(), config);
    assert!(result.is_err());
}
