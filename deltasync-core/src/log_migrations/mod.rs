//! Event log database migrations
//!
//! Each migration is a tuple of (name, sql_content), applied in order.
//! `000_migrations` bootstraps the bookkeeping table and must stay first.

const MIGRATIONS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS sys_migrations (
    migration_name VARCHAR PRIMARY KEY,
    applied_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);
"#;

const SYNC_EVENTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS sync_events (
    id UBIGINT PRIMARY KEY,
    timestamp BIGINT NOT NULL,
    run_id VARCHAR NOT NULL,
    job VARCHAR NOT NULL,
    event VARCHAR NOT NULL,
    identifier VARCHAR,
    rows BIGINT,
    detail VARCHAR,
    error_message VARCHAR
);
CREATE INDEX IF NOT EXISTS idx_sync_events_timestamp ON sync_events (timestamp);
"#;

const SYNC_EVENTS_RUN_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_sync_events_run ON sync_events (run_id);
"#;

/// All event log migrations.
///
/// When adding a migration, append it with the next number; never reorder.
pub const LOG_MIGRATIONS: &[(&str, &str)] = &[
    ("000_migrations", MIGRATIONS_TABLE),
    ("001_sync_events", SYNC_EVENTS_TABLE),
    ("002_sync_events_run_index", SYNC_EVENTS_RUN_INDEX),
];
