//! Sync run report and the events emitted while a run progresses

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::row::Identifier;

/// Why an identifier produced no rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Data source answered with a non-success status
    NoData,
    /// Network failure or undecodable body
    Transport,
    /// Response had no data key
    MissingDataKey,
    /// Data key (or a bundle under it) was not a mapping
    MalformedPayload,
    /// A bundle lacked a configured column under the skip-identifier policy
    MissingColumn,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoData => "no_data",
            Self::Transport => "transport",
            Self::MissingDataKey => "missing_data_key",
            Self::MalformedPayload => "malformed_payload",
            Self::MissingColumn => "missing_column",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedIdentifier {
    pub identifier: Identifier,
    pub reason: SkipReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Summary of one sync invocation
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub run_id: Uuid,
    pub job: String,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Identifiers supplied by the caller
    pub requested: usize,
    /// Identifiers skipped because the store already had them
    pub already_present: usize,
    /// Identifiers sent to the data source (each exactly once)
    pub attempted: usize,
    /// Attempted identifiers whose payload was flattened into rows
    pub fetched: usize,
    pub rows_written: usize,
    /// Records dropped under the skip-record policy
    pub records_skipped: usize,
    pub skipped: Vec<SkippedIdentifier>,
}

impl SyncReport {
    pub fn new(job: impl Into<String>, dry_run: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            job: job.into(),
            dry_run,
            started_at: Utc::now(),
            finished_at: None,
            requested: 0,
            already_present: 0,
            attempted: 0,
            fetched: 0,
            rows_written: 0,
            records_skipped: 0,
            skipped: Vec::new(),
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }
}

/// Structured diagnostic emitted by the sync engine
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncEvent {
    RunStarted {
        requested: usize,
        dry_run: bool,
    },
    DeltaComputed {
        existing: usize,
        to_fetch: usize,
    },
    IdentifierSkipped {
        identifier: Identifier,
        reason: SkipReason,
        detail: Option<String>,
    },
    RecordSkipped {
        identifier: Identifier,
        timestamp: String,
        column: String,
    },
    RowsWritten {
        identifier: Identifier,
        rows: usize,
    },
    RunFinished {
        rows_written: usize,
        skipped: usize,
    },
    RunFailed {
        error: String,
    },
}

impl SyncEvent {
    /// Stable event name for persisted logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RunStarted { .. } => "run_started",
            Self::DeltaComputed { .. } => "delta_computed",
            Self::IdentifierSkipped { .. } => "identifier_skipped",
            Self::RecordSkipped { .. } => "record_skipped",
            Self::RowsWritten { .. } => "rows_written",
            Self::RunFinished { .. } => "run_finished",
            Self::RunFailed { .. } => "run_failed",
        }
    }

    pub fn identifier(&self) -> Option<&str> {
        match self {
            Self::IdentifierSkipped { identifier, .. }
            | Self::RecordSkipped { identifier, .. }
            | Self::RowsWritten { identifier, .. } => Some(identifier),
            _ => None,
        }
    }

    pub fn rows(&self) -> Option<usize> {
        match self {
            Self::RowsWritten { rows, .. } => Some(*rows),
            Self::RunFinished { rows_written, .. } => Some(*rows_written),
            _ => None,
        }
    }

    /// Error text for failure events
    pub fn error(&self) -> Option<String> {
        match self {
            Self::RunFailed { error } => Some(error.clone()),
            _ => None,
        }
    }

    /// Human-readable detail, if any
    pub fn detail(&self) -> Option<String> {
        match self {
            Self::IdentifierSkipped { reason, detail, .. } => Some(match detail {
                Some(d) => format!("{}: {}", reason, d),
                None => reason.to_string(),
            }),
            Self::RecordSkipped { timestamp, column, .. } => {
                Some(format!("record '{}' missing column '{}'", timestamp, column))
            }
            Self::DeltaComputed { existing, to_fetch } => {
                Some(format!("{} existing, {} to fetch", existing, to_fetch))
            }
            _ => None,
        }
    }
}
