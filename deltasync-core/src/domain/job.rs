//! Sync job definition

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use super::result::{Error, Result};
use super::statement::SqlIdent;

/// Query parameters sent to the data source
pub type QueryParams = BTreeMap<String, String>;

/// What to do when a value-bundle lacks one of the configured columns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MissingColumnPolicy {
    /// Fail the whole run with an extraction error
    #[default]
    Abort,
    /// Drop only the offending record
    SkipRecord,
    /// Drop every record of the offending identifier
    SkipIdentifier,
}

impl MissingColumnPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Abort => "abort",
            Self::SkipRecord => "skipRecord",
            Self::SkipIdentifier => "skipIdentifier",
        }
    }
}

/// A validated sync target: where to fetch from and where rows land
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncJob {
    pub name: String,
    pub endpoint: String,
    pub table: SqlIdent,
    /// Response field holding the timestamp -> value-bundle mapping
    pub data_key: String,
    pub columns: Vec<SqlIdent>,
    pub unique_column: SqlIdent,
    /// Template copied for every request before the identifier is injected
    pub params: QueryParams,
    pub missing_column: MissingColumnPolicy,
}

impl SyncJob {
    /// Create a job, validating every SQL name it will interpolate
    pub fn new<S: AsRef<str>>(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        table: &str,
        data_key: impl Into<String>,
        columns: &[S],
        unique_column: &str,
    ) -> Result<Self> {
        let columns = columns
            .iter()
            .map(|c| SqlIdent::new(c.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        let job = Self {
            name: name.into(),
            endpoint: endpoint.into(),
            table: SqlIdent::new(table)?,
            data_key: data_key.into(),
            columns,
            unique_column: SqlIdent::new(unique_column)?,
            params: QueryParams::new(),
            missing_column: MissingColumnPolicy::default(),
        };
        job.validate()?;
        Ok(job)
    }

    pub fn with_params(mut self, params: QueryParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_missing_column(mut self, policy: MissingColumnPolicy) -> Self {
        self.missing_column = policy;
        self
    }

    /// Column list of every insert: unique column, data columns, `latest_date`
    pub fn insert_columns(&self) -> Vec<SqlIdent> {
        let mut cols = Vec::with_capacity(self.columns.len() + 2);
        cols.push(self.unique_column.clone());
        cols.extend(self.columns.iter().cloned());
        cols.push(SqlIdent::latest_date());
        cols
    }

    /// Request parameters for one identifier
    pub fn params_for(&self, identifier: &str) -> QueryParams {
        let mut params = self.params.clone();
        params.insert(self.unique_column.as_str().to_string(), identifier.to_string());
        params
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("job name cannot be empty"));
        }
        if self.data_key.is_empty() {
            return Err(Error::validation(format!(
                "job '{}' has an empty data key",
                self.name
            )));
        }

        // The insert column list must not name a column twice
        let mut seen = HashSet::new();
        for col in self.insert_columns() {
            let lower = col.as_str().to_ascii_lowercase();
            if !seen.insert(lower) {
                return Err(Error::validation(format!(
                    "job '{}' uses column '{}' more than once",
                    self.name, col
                )));
            }
        }
        Ok(())
    }
}
