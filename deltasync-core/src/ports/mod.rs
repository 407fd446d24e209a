//! Port definitions (hexagonal architecture)
//!
//! Ports define the interfaces for external dependencies. The sync engine
//! depends only on these traits, not on concrete implementations.

mod data_source;
mod record_store;
mod sync_observer;

pub use data_source::DataSource;
pub use record_store::RecordStore;
pub use sync_observer::SyncObserver;
