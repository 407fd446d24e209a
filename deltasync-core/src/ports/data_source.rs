//! Data source port
//!
//! Defines the interface for reading structured data from an external API.

use serde_json::Value as JsonValue;

use crate::domain::result::Result;
use crate::domain::QueryParams;

/// Parameterised read access to an external API
///
/// Implementations return `Ok(None)` when the source answered but not with
/// success; the caller decides whether to skip or retry. Transport-level
/// failures come back as [`crate::Error::Transport`].
pub trait DataSource: Send + Sync {
    /// Short name used in diagnostics (e.g. "http")
    fn name(&self) -> &str;

    /// Fetch `endpoint` with the given query parameters
    fn fetch(&self, endpoint: &str, params: &QueryParams) -> Result<Option<JsonValue>>;
}
