//! Cairn - an embedded SQL store that lives on its own thread
//!
//! A single in-memory SQLite database is owned by a dedicated execution
//! context. Callers reach it through an async [`Bridge`] that batches
//! concurrent reads, correlates responses, and times requests out. Mutations
//! are flushed to disk as whole-database snapshots after a quiet period, with
//! at most one flush in flight and atomic replacement of the previous file.
//!
//! # Quick Start
//!
//! ```ignore
//! use cairn::{Cairn, Value};
//!
//! let db = Cairn::open("./data").await?;
//! db.execute("CREATE TABLE t (x INTEGER)", vec![]).await?;
//! db.execute("INSERT INTO t (x) VALUES (?1)", vec![Value::Int(1)]).await?;
//! let rows = db.query("SELECT x FROM t", vec![]).await?;
//! db.close().await?;
//! ```
//!
//! # Architecture
//!
//! Everything public lives in the executor crate and is re-exported here.
//! The engine, durability and core crates are implementation layers.

pub use cairn_executor::*;
