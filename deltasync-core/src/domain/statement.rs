//! SQL identifiers and parameterised statements
//!
//! Table and column names cannot be bound as parameters, so they are
//! validated against a strict allow-list and double-quoted before being
//! interpolated. Everything else travels as a `?` placeholder.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::result::{Error, Result};

/// Column that receives the record timestamp on every insert
pub const LATEST_DATE_COLUMN: &str = "latest_date";

fn ident_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("static regex"))
}

/// A validated SQL identifier (table or column name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SqlIdent(String);

impl SqlIdent {
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if !ident_regex().is_match(&name) {
            return Err(Error::validation(format!(
                "'{}' is not a valid SQL identifier",
                name
            )));
        }
        Ok(Self(name))
    }

    /// The trailing timestamp column
    pub fn latest_date() -> Self {
        Self(LATEST_DATE_COLUMN.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Double-quoted form for interpolation into SQL text
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl fmt::Display for SqlIdent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SqlIdent {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<SqlIdent> for String {
    fn from(value: SqlIdent) -> Self {
        value.0
    }
}

/// SQL text plus its positional bind values
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<JsonValue>,
}

impl Statement {
    /// `SELECT DISTINCT "<column>" FROM "<table>"`
    pub fn select_distinct(table: &SqlIdent, column: &SqlIdent) -> Self {
        Self {
            sql: format!(
                "SELECT DISTINCT {} FROM {}",
                column.quoted(),
                table.quoted()
            ),
            params: Vec::new(),
        }
    }

    /// Single-row insert with one placeholder per column
    pub fn insert_row(table: &SqlIdent, columns: &[SqlIdent], values: Vec<JsonValue>) -> Result<Self> {
        if columns.len() != values.len() {
            return Err(Error::validation(format!(
                "insert into {} has {} columns but {} values",
                table,
                columns.len(),
                values.len()
            )));
        }

        let column_list = columns
            .iter()
            .map(SqlIdent::quoted)
            .collect::<Vec<_>>()
            .join(", ");
        let placeholders = vec!["?"; columns.len()].join(", ");

        Ok(Self {
            sql: format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table.quoted(),
                column_list,
                placeholders
            ),
            params: values,
        })
    }
}
