//! Error types for the caller side of the bridge.
//!
//! Every bridge call returns [`Result`]. The variants separate failures of
//! the transport (the execution context went away, a request timed out)
//! from failures reported by the engine for one command.
//!
//! | Variant | Raised when | Affects |
//! |---------|-------------|---------|
//! | `Channel` | context terminated, channel closed | every pending request |
//! | `Engine` | SQL, constraint, not initialized, ... | that request only |
//! | `Timeout` | no response within the request timeout | that request only |
//! | `Persistence` | data directory or snapshot I/O at open | open |
//! | `Config` | invalid `cairn.toml` | open |
//! | `Internal` | unexpected output, thread failures | that request only |

use cairn_core::{EngineError, ErrorKind, RequestId};
use cairn_durability::PersistenceError;
use cairn_engine::{ConfigError, ContextError};
use serde::{Deserialize, Serialize};

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, Error>;

/// Bridge errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum Error {
    /// Transport or execution context failure
    #[error("channel error: {reason}")]
    Channel {
        /// What happened to the channel
        reason: String,
    },

    /// The engine rejected the command
    #[error("engine error: {0}")]
    Engine(EngineError),

    /// No response arrived in time
    #[error("request {id} timed out after {timeout_ms} ms")]
    Timeout {
        /// The request that timed out
        id: RequestId,
        /// Configured timeout
        timeout_ms: u64,
    },

    /// Snapshot or data directory I/O failed
    #[error("persistence error: {reason}")]
    Persistence {
        /// Underlying failure
        reason: String,
    },

    /// Configuration is invalid
    #[error("config error: {reason}")]
    Config {
        /// Underlying failure
        reason: String,
    },

    /// Unexpected state
    #[error("internal error: {reason}")]
    Internal {
        /// Details
        reason: String,
    },
}

impl Error {
    /// Engine error kind, when this is an engine error.
    pub fn engine_kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Engine(e) => Some(e.kind),
            _ => None,
        }
    }

    /// Whether the execution context is gone.
    pub fn is_channel(&self) -> bool {
        matches!(self, Error::Channel { .. })
    }

    pub(crate) fn channel(reason: impl Into<String>) -> Self {
        Error::Channel {
            reason: reason.into(),
        }
    }

    pub(crate) fn unexpected(command: &str, output: &cairn_core::Output) -> Self {
        Error::Internal {
            reason: format!(
                "unexpected output for {}: {}",
                command,
                output.variant_name()
            ),
        }
    }
}

impl From<EngineError> for Error {
    fn from(e: EngineError) -> Self {
        Error::Engine(e)
    }
}

impl From<PersistenceError> for Error {
    fn from(e: PersistenceError) -> Self {
        Error::Persistence {
            reason: e.to_string(),
        }
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config {
            reason: e.to_string(),
        }
    }
}

impl From<ContextError> for Error {
    fn from(e: ContextError) -> Self {
        match e {
            ContextError::Persistence(p) => p.into(),
            other => Error::Internal {
                reason: other.to_string(),
            },
        }
    }
}
