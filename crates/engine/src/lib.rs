//! Execution engine for Cairn
//!
//! This crate owns everything that runs on the engine side of the bridge:
//! - Store: the in-memory relational store and its snapshot images
//! - ExecutionContext: the dedicated thread that processes commands serially
//! - PersistenceController: debounce and single-flight flush decisions
//! - Command channel: crossbeam inbound, tokio outbound
//! - Config: `cairn.toml`
//!
//! The store is only ever touched by the engine thread; snapshot files are
//! only ever written by the persistence host thread.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod config;
pub mod context;
pub mod persistence;
pub mod store;

pub use channel::{
    duplex, ChannelClosed, ChannelEvent, ClientEnd, CommandSender, ContextEnd, EventReceiver,
    EventSender,
};
pub use config::{
    CairnConfig, ConfigError, PersistenceConfig, RetryPolicy, CONFIG_FILE_NAME, DEFAULT_DB_NAME,
};
pub use context::{ContextError, ExecutionContext};
pub use persistence::{
    FlushDecision, PersistenceController, PersistencePhase, PersistenceStatus, SharedStatus,
};
pub use store::Store;
