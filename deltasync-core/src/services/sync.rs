//! Sync service - fetch missing identifiers from a data source into the store
//!
//! A run reads the identifiers already present in the target table, fetches
//! only the ones that are missing, flattens each payload's time-keyed
//! records into rows and inserts them one at a time. It is insert-only:
//! identifiers already stored are never refreshed.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::{Map, Value as JsonValue};
use tracing::debug;

use crate::domain::result::{Error, Result};
use crate::domain::{
    identifier_from_value, Identifier, MissingColumnPolicy, Row, SkipReason, SkippedIdentifier,
    Statement, SyncEvent, SyncJob, SyncReport,
};
use crate::ports::{DataSource, RecordStore, SyncObserver};
use crate::services::observer::TracingObserver;

/// Compute `identifiers - existing`, keeping the caller's order.
///
/// Repeated identifiers are kept once, at their first position.
pub fn compute_delta<S: AsRef<str>>(
    identifiers: &[S],
    existing: &HashSet<Identifier>,
) -> Vec<Identifier> {
    let mut seen = HashSet::new();
    identifiers
        .iter()
        .map(AsRef::as_ref)
        .filter(|id| !existing.contains(*id))
        .filter(|id| seen.insert(*id))
        .map(str::to_string)
        .collect()
}

/// The sync engine
///
/// Holds the data source, the record store and the observer that receives
/// its diagnostics. Runs are strictly sequential; the service keeps no
/// state between runs.
pub struct SyncService {
    source: Arc<dyn DataSource>,
    store: Arc<dyn RecordStore>,
    observer: Arc<dyn SyncObserver>,
}

impl SyncService {
    pub fn new(source: Arc<dyn DataSource>, store: Arc<dyn RecordStore>) -> Self {
        Self {
            source,
            store,
            observer: Arc::new(TracingObserver),
        }
    }

    /// Replace the default tracing observer
    pub fn with_observer(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Identifiers currently present in the job's unique column
    ///
    /// Read fresh on every call; the store is the source of truth.
    pub fn existing_entries(&self, job: &SyncJob) -> Result<HashSet<Identifier>> {
        let stmt = Statement::select_distinct(&job.table, &job.unique_column);
        let rows = self.store.read_statement(&stmt)?;
        Ok(rows
            .iter()
            .filter_map(|row| row.first())
            .filter_map(identifier_from_value)
            .collect())
    }

    /// Fetch and store every identifier not yet present
    pub fn sync<S: AsRef<str>>(&self, job: &SyncJob, identifiers: &[S]) -> Result<SyncReport> {
        self.run(job, identifiers, false)
    }

    /// Same as [`sync`](Self::sync) but without issuing any writes.
    ///
    /// `rows_written` in the report counts the rows that would have been
    /// inserted.
    pub fn dry_run<S: AsRef<str>>(&self, job: &SyncJob, identifiers: &[S]) -> Result<SyncReport> {
        self.run(job, identifiers, true)
    }

    fn run<S: AsRef<str>>(
        &self,
        job: &SyncJob,
        identifiers: &[S],
        dry_run: bool,
    ) -> Result<SyncReport> {
        let mut report = SyncReport::new(&job.name, dry_run);
        report.requested = identifiers.len();
        debug!(
            run_id = %report.run_id,
            source = self.source.name(),
            table = job.table.as_str(),
            "Starting sync run"
        );
        self.emit(
            &report,
            SyncEvent::RunStarted {
                requested: report.requested,
                dry_run,
            },
        );

        match self.run_inner(job, identifiers, &mut report) {
            Ok(()) => {
                report.finish();
                self.emit(
                    &report,
                    SyncEvent::RunFinished {
                        rows_written: report.rows_written,
                        skipped: report.skipped.len(),
                    },
                );
                Ok(report)
            }
            Err(e) => {
                self.emit(&report, SyncEvent::RunFailed { error: e.to_string() });
                Err(e)
            }
        }
    }

    fn run_inner<S: AsRef<str>>(
        &self,
        job: &SyncJob,
        identifiers: &[S],
        report: &mut SyncReport,
    ) -> Result<()> {
        // Without this snapshot there is no dedup boundary, so failure is fatal
        let existing = self.existing_entries(job)?;
        let to_fetch = compute_delta(identifiers, &existing);

        report.already_present = identifiers
            .iter()
            .map(AsRef::as_ref)
            .filter(|id| existing.contains(*id))
            .collect::<HashSet<_>>()
            .len();
        report.attempted = to_fetch.len();
        self.emit(
            report,
            SyncEvent::DeltaComputed {
                existing: existing.len(),
                to_fetch: to_fetch.len(),
            },
        );

        for identifier in &to_fetch {
            self.sync_identifier(job, identifier, report)?;
        }
        Ok(())
    }

    fn sync_identifier(
        &self,
        job: &SyncJob,
        identifier: &str,
        report: &mut SyncReport,
    ) -> Result<()> {
        let params = job.params_for(identifier);

        let payload = match self.source.fetch(&job.endpoint, &params) {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                self.skip(report, identifier, SkipReason::NoData, None);
                return Ok(());
            }
            Err(e) if e.is_recoverable() => {
                self.skip(report, identifier, SkipReason::Transport, Some(e.to_string()));
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let records = match payload.get(&job.data_key) {
            Some(JsonValue::Object(records)) => records,
            Some(other) => {
                let detail = format!("'{}' holds {}", job.data_key, json_kind(other));
                self.skip(report, identifier, SkipReason::MalformedPayload, Some(detail));
                return Ok(());
            }
            None => {
                self.skip(report, identifier, SkipReason::MissingDataKey, None);
                return Ok(());
            }
        };

        // Flatten everything before the first write so an aborted
        // identifier leaves nothing behind
        let rows = match self.flatten(job, identifier, records, report)? {
            Some(rows) => rows,
            None => return Ok(()),
        };
        report.fetched += 1;

        let columns = job.insert_columns();
        let count = rows.len();
        if !report.dry_run {
            for row in rows {
                let stmt = Statement::insert_row(&job.table, &columns, row.into_params())?;
                self.store.write_statement(&stmt)?;
            }
        }
        report.rows_written += count;

        self.emit(
            report,
            SyncEvent::RowsWritten {
                identifier: identifier.to_string(),
                rows: count,
            },
        );
        Ok(())
    }

    /// Turn `{timestamp: bundle}` into rows, applying the missing-column policy.
    ///
    /// `Ok(None)` means the identifier was skipped.
    fn flatten(
        &self,
        job: &SyncJob,
        identifier: &str,
        records: &Map<String, JsonValue>,
        report: &mut SyncReport,
    ) -> Result<Option<Vec<Row>>> {
        let mut rows = Vec::with_capacity(records.len());

        for (timestamp, bundle) in records {
            let Some(bundle) = bundle.as_object() else {
                let detail = format!("record '{}' holds {}", timestamp, json_kind(bundle));
                self.skip(report, identifier, SkipReason::MalformedPayload, Some(detail));
                return Ok(None);
            };

            let err = match Row::extract(identifier, timestamp, bundle, &job.columns) {
                Ok(row) => {
                    rows.push(row);
                    continue;
                }
                Err(err) => err,
            };

            let column = match &err {
                Error::Extraction { column, .. } => column.clone(),
                _ => return Err(err),
            };

            match job.missing_column {
                MissingColumnPolicy::Abort => return Err(err),
                MissingColumnPolicy::SkipRecord => {
                    report.records_skipped += 1;
                    self.emit(
                        report,
                        SyncEvent::RecordSkipped {
                            identifier: identifier.to_string(),
                            timestamp: timestamp.clone(),
                            column,
                        },
                    );
                }
                MissingColumnPolicy::SkipIdentifier => {
                    self.skip(report, identifier, SkipReason::MissingColumn, Some(err.to_string()));
                    return Ok(None);
                }
            }
        }

        Ok(Some(rows))
    }

    fn skip(
        &self,
        report: &mut SyncReport,
        identifier: &str,
        reason: SkipReason,
        detail: Option<String>,
    ) {
        report.skipped.push(SkippedIdentifier {
            identifier: identifier.to_string(),
            reason,
            detail: detail.clone(),
        });
        self.emit(
            report,
            SyncEvent::IdentifierSkipped {
                identifier: identifier.to_string(),
                reason,
                detail,
            },
        );
    }

    fn emit(&self, report: &SyncReport, event: SyncEvent) {
        self.observer.on_event(report.run_id, &report.job, &event);
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}
