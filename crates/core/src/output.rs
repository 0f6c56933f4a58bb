//! Output enum and response message.
//!
//! Every processed command produces exactly one [`ResponseMessage`]. On
//! success it carries the [`Output`] variant that matches the command; on
//! failure it carries an [`EngineError`].

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::types::*;

/// Successful command results.
///
/// Each [`Command`](crate::Command) variant maps to exactly one `Output`
/// variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Output {
    /// `init` succeeded; the store is ready
    Ready,

    /// Rows from a `query`
    Rows(QueryResult),

    /// Effect of an `execute`
    Changes(ExecuteResult),

    /// Ordered per-operation results from a `batch_query`
    Batch(Vec<BatchItemResult>),

    /// Serialized store from `export`
    Snapshot {
        /// Snapshot bytes, loadable by `init`
        data: Vec<u8>,
    },

    /// `ping` report
    Pong(PingInfo),

    /// `close` finished its final flush
    Closed,
}

impl Output {
    /// Short name of the variant, for diagnostics.
    pub fn variant_name(&self) -> &'static str {
        match self {
            Output::Ready => "Ready",
            Output::Rows(_) => "Rows",
            Output::Changes(_) => "Changes",
            Output::Batch(_) => "Batch",
            Output::Snapshot { .. } => "Snapshot",
            Output::Pong(_) => "Pong",
            Output::Closed => "Closed",
        }
    }
}

/// The single reply to one [`CommandMessage`](crate::CommandMessage).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage {
    /// Id of the command this answers
    pub id: RequestId,
    /// Output on success, engine error on failure
    pub outcome: std::result::Result<Output, EngineError>,
    /// Time spent processing the command, in microseconds
    pub duration_us: u64,
}

impl ResponseMessage {
    /// Successful response.
    pub fn success(id: RequestId, output: Output, duration_us: u64) -> Self {
        Self {
            id,
            outcome: Ok(output),
            duration_us,
        }
    }

    /// Failed response.
    pub fn failure(id: RequestId, error: EngineError, duration_us: u64) -> Self {
        Self {
            id,
            outcome: Err(error),
            duration_us,
        }
    }

    /// Whether the command succeeded.
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}
