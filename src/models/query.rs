//! Query-related data models.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// One result or sample row, keyed by column name.
pub type Row = serde_json::Map<String, JsonValue>;

/// Rows returned by the database for one statement.
///
/// `columns` keeps the result column order; rows are keyed by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
    pub truncated: bool,
    pub execution_time_ms: u64,
}

impl QueryResult {
    pub fn empty(execution_time_ms: u64) -> Self {
        Self {
            execution_time_ms,
            ..Self::default()
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// SQL produced for a question, with the model's explanation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqlGeneration {
    #[serde(default)]
    pub sql: String,
    #[serde(default)]
    pub explanation: String,
}

impl SqlGeneration {
    pub fn new(sql: impl Into<String>, explanation: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            explanation: explanation.into(),
        }
    }

    /// True when the model produced no usable statement.
    pub fn is_empty(&self) -> bool {
        self.sql.trim().is_empty()
    }
}
