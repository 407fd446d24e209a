//! Core domain types
//!
//! Pure data structures with validation logic - no I/O or external dependencies.

mod job;
mod report;
pub mod result;
mod row;
mod statement;

pub use job::{MissingColumnPolicy, QueryParams, SyncJob};
pub use report::{SkipReason, SkippedIdentifier, SyncEvent, SyncReport};
pub use row::{identifier_from_value, Identifier, Row};
pub use statement::{SqlIdent, Statement, LATEST_DATE_COLUMN};
