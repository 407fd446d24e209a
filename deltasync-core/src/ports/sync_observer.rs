//! Sync observer port - structured diagnostics sink

use uuid::Uuid;

use crate::domain::SyncEvent;

/// Receives every event the sync engine emits
///
/// Observers must not fail the run; implementations swallow their own
/// errors.
pub trait SyncObserver: Send + Sync {
    fn on_event(&self, run_id: Uuid, job: &str, event: &SyncEvent);
}
