//! Shipped sync observers

use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::SyncEvent;
use crate::ports::SyncObserver;

/// Forwards sync events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl SyncObserver for TracingObserver {
    fn on_event(&self, run_id: Uuid, job: &str, event: &SyncEvent) {
        match event {
            SyncEvent::RunStarted { requested, dry_run } => {
                info!(%run_id, job, requested, dry_run, "Sync started");
            }
            SyncEvent::DeltaComputed { existing, to_fetch } => {
                info!(%run_id, job, existing, to_fetch, "Computed identifiers to fetch");
            }
            SyncEvent::IdentifierSkipped {
                identifier,
                reason,
                detail,
            } => {
                warn!(
                    %run_id,
                    job,
                    identifier = identifier.as_str(),
                    reason = reason.as_str(),
                    detail = detail.as_deref().unwrap_or(""),
                    "Skipping identifier"
                );
            }
            SyncEvent::RecordSkipped {
                identifier,
                timestamp,
                column,
            } => {
                warn!(
                    %run_id,
                    job,
                    identifier = identifier.as_str(),
                    timestamp = timestamp.as_str(),
                    column = column.as_str(),
                    "Skipping record with missing column"
                );
            }
            SyncEvent::RowsWritten { identifier, rows } => {
                debug!(%run_id, job, identifier = identifier.as_str(), rows, "Rows written");
            }
            SyncEvent::RunFinished {
                rows_written,
                skipped,
            } => {
                info!(%run_id, job, rows_written, skipped, "Sync finished");
            }
            SyncEvent::RunFailed { error } => {
                warn!(%run_id, job, error = error.as_str(), "Sync failed");
            }
        }
    }
}

/// Fan-out to several observers, in registration order
#[derive(Default, Clone)]
pub struct Observers {
    observers: Vec<Arc<dyn SyncObserver>>,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, observer: Arc<dyn SyncObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl SyncObserver for Observers {
    fn on_event(&self, run_id: Uuid, job: &str, event: &SyncEvent) {
        for observer in &self.observers {
            observer.on_event(run_id, job, event);
        }
    }
}

/// Keeps every event in memory
///
/// Handy for tests and for callers that want the event stream after a run.
#[derive(Debug, Default)]
pub struct CollectingObserver {
    events: Mutex<Vec<SyncEvent>>,
}

impl CollectingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<SyncEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl SyncObserver for CollectingObserver {
    fn on_event(&self, _run_id: Uuid, _job: &str, event: &SyncEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
