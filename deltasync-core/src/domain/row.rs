//! Identifiers and flattened rows

use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use super::result::{Error, Result};
use super::statement::SqlIdent;

/// Opaque key of a tracked entity (ticker, device id, ...)
pub type Identifier = String;

/// Largest magnitude below which every whole f64 is an exact integer (2^53)
const MAX_EXACT_FLOAT_INT: f64 = 9_007_199_254_740_992.0;

/// Normalise a value read back from the store's unique column.
///
/// Strings compare as-is, numbers and booleans by their canonical text.
/// Whole floats (DOUBLE or DECIMAL columns) render without a fraction, so
/// a stored `42.0` matches the identifier `"42"`. NULLs are never an
/// identifier.
pub fn identifier_from_value(value: &JsonValue) -> Option<Identifier> {
    match value {
        JsonValue::Null => None,
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < MAX_EXACT_FLOAT_INT => {
                Some((f as i64).to_string())
            }
            _ => Some(n.to_string()),
        },
        JsonValue::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// One store-ready tuple: identifier, a value per configured column, timestamp
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub identifier: Identifier,
    pub values: Vec<JsonValue>,
    pub timestamp: String,
}

impl Row {
    /// Build a row from one (timestamp, value-bundle) record.
    ///
    /// Values are taken in `columns` order; the first absent column is
    /// reported as an extraction error.
    pub fn extract(
        identifier: &str,
        timestamp: &str,
        bundle: &Map<String, JsonValue>,
        columns: &[SqlIdent],
    ) -> Result<Self> {
        let values = columns
            .iter()
            .map(|col| {
                bundle
                    .get(col.as_str())
                    .cloned()
                    .ok_or_else(|| Error::Extraction {
                        identifier: identifier.to_string(),
                        timestamp: timestamp.to_string(),
                        column: col.as_str().to_string(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            identifier: identifier.to_string(),
            values,
            timestamp: timestamp.to_string(),
        })
    }

    /// Number of positional values (always `columns + 2`)
    pub fn arity(&self) -> usize {
        self.values.len() + 2
    }

    /// Positional bind values in insert order
    pub fn into_params(self) -> Vec<JsonValue> {
        let mut params = Vec::with_capacity(self.values.len() + 2);
        params.push(JsonValue::String(self.identifier));
        params.extend(self.values);
        params.push(JsonValue::String(self.timestamp));
        params
    }
}
