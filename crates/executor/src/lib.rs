//! # Cairn Executor
//!
//! The caller-facing API for Cairn: an embedded SQL store that lives on its
//! own thread, reached through an async bridge, and flushed to disk with
//! debounced, crash-safe snapshots.
//!
//! This is the only crate users need to import. It provides:
//! - [`Cairn`] - open a data directory (or an in-memory database)
//! - [`Bridge`] - cloneable async handle; one method per command
//! - [`Value`], [`QueryResult`], [`ExecuteResult`] - data in and out
//! - [`Error`] - channel, engine, timeout and setup failures
//!
//! ## Quick Start
//!
//! ```text
//! use cairn_executor::{Cairn, Value};
//!
//! let db = Cairn::open("/path/to/data").await?;
//! db.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)", vec![]).await?;
//! db.execute("INSERT INTO users (name) VALUES (?1)", vec![Value::from("ada")]).await?;
//!
//! let rows = db.query("SELECT name FROM users", vec![]).await?;
//! db.close().await?;
//! ```
//!
//! ## Request Flow
//!
//! | Command | Path | Marks store dirty |
//! |---------|------|-------------------|
//! | `init` | direct | no |
//! | `query` | batched (merged) | no |
//! | `execute` | direct | yes |
//! | `batch_query` | batched | no |
//! | `export` | batched | no |
//! | `ping` | direct | no |
//! | `close` | direct, after the queue drains | flushes |

#![warn(missing_docs)]

mod bridge;
mod correlator;
mod database;
mod error;
mod queue;

// Test modules
#[cfg(test)]
mod tests;

// =============================================================================
// Public API - Everything users need is re-exported here
// =============================================================================

pub use bridge::{Bridge, BridgeConfig, DEFAULT_REQUEST_TIMEOUT};
pub use database::Cairn;
pub use error::{Error, Result};
pub use queue::QueueConfig;

// Re-export lower layers for callers that wire the stack themselves
pub use cairn_core::{
    BatchItemResult, BatchOperation, Command, CommandKind, CommandMessage, EngineError,
    EngineResult, ErrorKind, ExecuteResult, Output, PingInfo, QueryResult, RequestId,
    ResponseMessage, Row, Statement, Value,
};
pub use cairn_durability::{FileSnapshotStore, SaveOutcome, SaveRequest, SnapshotSink};
pub use cairn_engine::{
    duplex, CairnConfig, ChannelEvent, ClientEnd, ContextEnd, ExecutionContext,
    PersistenceConfig, PersistenceStatus, RetryPolicy,
};
