//! Record store port - relational store abstraction

use serde_json::Value as JsonValue;

use crate::domain::result::Result;
use crate::domain::Statement;

/// Parameterised read/write access to a relational store
///
/// Every `write` is its own atomic unit and is committed before returning.
/// Failures propagate as [`crate::Error::Store`]; nothing is retried here.
pub trait RecordStore: Send + Sync {
    /// Execute a read statement and return every row verbatim
    fn read_all(&self, sql: &str, params: &[JsonValue]) -> Result<Vec<Vec<JsonValue>>>;

    /// Execute a single write statement, returning the affected row count
    fn write(&self, sql: &str, params: &[JsonValue]) -> Result<usize>;

    /// Release the underlying connection. Calling it twice is harmless.
    fn close(&self) -> Result<()>;

    fn read_statement(&self, stmt: &Statement) -> Result<Vec<Vec<JsonValue>>> {
        self.read_all(&stmt.sql, &stmt.params)
    }

    fn write_statement(&self, stmt: &Statement) -> Result<usize> {
        self.write(&stmt.sql, &stmt.params)
    }
}
