//! Command enum defining every operation of the execution context.
//!
//! Commands are the "instruction set" of Cairn. Commands are:
//! - **Self-contained**: All parameters needed for execution are in the variant
//! - **Serializable**: Can be sent over any point-to-point channel
//! - **Pure data**: No closures or executable code

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{BatchOperation, RequestId};
use crate::value::Value;

/// A command is a self-contained, serializable operation.
///
/// Each variant maps to exactly one [`Output`](crate::Output) variant on
/// success.
///
/// | Command | Output | Batchable |
/// |---------|--------|-----------|
/// | `Init` | `Ready` | no |
/// | `Query` | `Rows` | yes (merged) |
/// | `Execute` | `Changes` | no |
/// | `BatchQuery` | `Batch` | yes (queued) |
/// | `Export` | `Snapshot` | yes (queued) |
/// | `Ping` | `Pong` | no |
/// | `Close` | `Closed` | no |
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub enum Command {
    /// Load a snapshot, or create an empty store when `snapshot` is `None`.
    /// Returns: `Output::Ready`
    Init {
        /// Snapshot image to load
        #[serde(default, skip_serializing_if = "Option::is_none")]
        snapshot: Option<Vec<u8>>,
    },

    /// Run a read-only statement.
    /// Returns: `Output::Rows`
    Query {
        /// A single read-only statement
        sql: String,
        /// Positional parameters (`?1`, `?2`, ...)
        #[serde(default)]
        params: Vec<Value>,
    },

    /// Run a mutating statement.
    /// Returns: `Output::Changes`
    Execute {
        /// One statement, or a script when there are no parameters
        sql: String,
        /// Positional parameters (`?1`, `?2`, ...)
        #[serde(default)]
        params: Vec<Value>,
    },

    /// Run several read-only statements in order.
    /// Returns: `Output::Batch`
    BatchQuery {
        /// Statements to run, in order
        operations: Vec<BatchOperation>,
        /// Share one read transaction across the operations
        #[serde(default)]
        use_transaction: bool,
    },

    /// Serialize the whole store.
    /// Returns: `Output::Snapshot`
    Export,

    /// Liveness check.
    /// Returns: `Output::Pong`
    Ping,

    /// Final flush, then teardown.
    /// Returns: `Output::Closed`
    Close,
}

/// Discriminant of a [`Command`], used for routing and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    /// `init`
    Init,
    /// `query`
    Query,
    /// `execute`
    Execute,
    /// `batch_query`
    BatchQuery,
    /// `export`
    Export,
    /// `ping`
    Ping,
    /// `close`
    Close,
}

impl CommandKind {
    /// Wire name of the command.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandKind::Init => "init",
            CommandKind::Query => "query",
            CommandKind::Execute => "execute",
            CommandKind::BatchQuery => "batch_query",
            CommandKind::Export => "export",
            CommandKind::Ping => "ping",
            CommandKind::Close => "close",
        }
    }

    /// Control and mutating commands are never held in the command queue.
    pub fn skips_batch(&self) -> bool {
        matches!(
            self,
            CommandKind::Init | CommandKind::Ping | CommandKind::Close | CommandKind::Execute
        )
    }

    /// Whether the command may change the store.
    pub fn is_mutation(&self) -> bool {
        matches!(self, CommandKind::Execute)
    }
}

impl std::fmt::Display for CommandKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Command {
    /// The command's kind.
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::Init { .. } => CommandKind::Init,
            Command::Query { .. } => CommandKind::Query,
            Command::Execute { .. } => CommandKind::Execute,
            Command::BatchQuery { .. } => CommandKind::BatchQuery,
            Command::Export => CommandKind::Export,
            Command::Ping => CommandKind::Ping,
            Command::Close => CommandKind::Close,
        }
    }
}

/// A command addressed to the execution context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandMessage {
    /// Unique request id; the response carries the same id
    pub id: RequestId,
    /// The operation
    pub command: Command,
    /// When the caller created the message
    pub submitted_at: DateTime<Utc>,
}

impl CommandMessage {
    /// Wrap a command with a fresh id.
    pub fn new(command: Command) -> Self {
        Self::with_id(RequestId::new(), command)
    }

    /// Wrap a command with a caller-chosen id.
    pub fn with_id(id: RequestId, command: Command) -> Self {
        Self {
            id,
            command,
            submitted_at: Utc::now(),
        }
    }

    /// The command's kind.
    pub fn kind(&self) -> CommandKind {
        self.command.kind()
    }
}
