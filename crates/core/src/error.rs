//! Engine error type
//!
//! Every failure that happens *inside* a command (bad SQL, constraint
//! violation, command issued before `init`) is reported as an
//! [`EngineError`] in a failed response. Engine errors never travel as
//! transport failures, so one bad statement cannot take the channel down.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for engine operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Classification of an engine failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Command arrived before `init`
    NotInitialized,
    /// `init` arrived for a context that already holds a store
    AlreadyInitialized,
    /// UNIQUE / NOT NULL / CHECK / FOREIGN KEY violation
    Constraint,
    /// Malformed SQL or unknown table/column
    Sql,
    /// Wrong parameter count, non read-only `query`, etc.
    InvalidInput,
    /// Store is locked or busy
    Busy,
    /// Snapshot could not be loaded or produced
    Snapshot,
    /// Final flush on `close` did not reach durable storage
    Persistence,
    /// Bug or invariant violation
    Internal,
}

impl ErrorKind {
    /// Stable snake_case name, matching the serialized form.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotInitialized => "not_initialized",
            ErrorKind::AlreadyInitialized => "already_initialized",
            ErrorKind::Constraint => "constraint",
            ErrorKind::Sql => "sql",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::Busy => "busy",
            ErrorKind::Snapshot => "snapshot",
            ErrorKind::Persistence => "persistence",
            ErrorKind::Internal => "internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failure reported by the execution context for one command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{kind}: {message}")]
pub struct EngineError {
    /// Failure class callers can branch on
    pub kind: ErrorKind,
    /// Human-readable detail from the engine
    pub message: String,
}

impl EngineError {
    /// Create an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// The store has not been initialized yet.
    pub fn not_initialized() -> Self {
        Self::new(
            ErrorKind::NotInitialized,
            "store is not initialized; send init first",
        )
    }

    /// Invalid caller input.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, message)
    }

    /// Internal failure.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}
