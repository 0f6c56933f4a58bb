//! Supporting types for commands and responses.
//!
//! These types are used in command payloads and response data.
//! All types are serializable so the message contract works over any
//! point-to-point channel.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;
use crate::value::Value;

// =============================================================================
// Request identity
// =============================================================================

/// Unique, opaque identifier of a command message.
///
/// Ids are random v4 UUIDs, so they stay unique for the lifetime of a
/// channel even when several bridges share one execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generate a fresh id.
    pub fn new() -> Self {
        RequestId(Uuid::new_v4())
    }

    /// Wrap an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        RequestId(uuid)
    }

    /// The underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// Statements
// =============================================================================

/// A SQL statement with positional parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    /// SQL text
    pub sql: String,
    /// Positional parameters (`?1`, `?2`, ...)
    #[serde(default)]
    pub params: Vec<Value>,
}

impl Statement {
    /// Create a statement with no parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Create a statement with parameters.
    pub fn with_params(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// One member of a `batch_query` payload.
///
/// When the command queue merges several caller queries into one batch,
/// `correlation_id` holds the id of the caller-facing request so the
/// batched result can be handed back to that caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchOperation {
    /// SQL text
    pub sql: String,
    /// Positional parameters
    #[serde(default)]
    pub params: Vec<Value>,
    /// Originating request, if this operation was merged by the queue
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<RequestId>,
}

impl From<Statement> for BatchOperation {
    fn from(stmt: Statement) -> Self {
        BatchOperation {
            sql: stmt.sql,
            params: stmt.params,
            correlation_id: None,
        }
    }
}

// =============================================================================
// Results
// =============================================================================

/// A row is an ordered list of cells, one per column.
pub type Row = Vec<Value>;

/// Result of a read-only query.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names in select order
    pub columns: Vec<String>,
    /// Result rows
    pub rows: Vec<Row>,
}

impl QueryResult {
    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the result has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Cell at `row`, `column` (by name).
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(idx))
    }
}

/// Result of a mutating statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExecuteResult {
    /// Rows changed by the statement
    pub changes: u64,
    /// Rowid of the most recent successful INSERT on the connection
    pub last_insert_id: i64,
}

/// Per-operation result inside a `batch_query` response.
///
/// Operations fail individually: one bad statement in a merged batch only
/// fails the caller that submitted it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItemResult {
    /// Copied from the operation's `correlation_id`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<RequestId>,
    /// Query result or engine error for this operation
    pub outcome: std::result::Result<QueryResult, EngineError>,
}

/// Liveness report returned by `ping`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingInfo {
    /// Whether a store has been initialized
    pub ready: bool,
    /// Approximate bytes held by the store
    pub memory_usage: u64,
}
