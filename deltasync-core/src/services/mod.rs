//! Service layer - business logic orchestration
//!
//! Services coordinate domain logic and port interactions: the sync engine
//! itself and the observers that record what it does.

pub mod event_log;
mod observer;
mod sync;

pub use event_log::{EventEntry, EventLog, EVENT_LOG_FILE};
pub use observer::{CollectingObserver, Observers, TracingObserver};
pub use sync::{compute_delta, SyncService};
