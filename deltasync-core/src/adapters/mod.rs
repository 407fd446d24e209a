//! Adapter implementations
//!
//! Adapters implement the port traits with concrete technologies:
//! - DuckDB for the RecordStore port
//! - Blocking HTTP client for the DataSource port
//! - Mock HTTP server standing in for a real API in tests

pub mod duckdb;
pub mod http;

#[cfg(test)]
pub mod mock_source;
