//! Durability layer for Cairn
//!
//! This crate handles everything that touches disk:
//!
//! - Atomic file replacement (temp file, fsync, rename, directory fsync)
//! - Snapshot sinks: where serialized stores are made durable
//! - Persistence host: background thread that performs the physical writes
//!   and reports outcomes out-of-band
//! - Testing sink with failure injection and write holds

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod atomic;
pub mod error;
pub mod host;
pub mod sink;
pub mod testing;

pub use atomic::{cleanup_temp_files, temp_path, write_atomic, AtomicWriteInfo};
pub use error::{PersistenceError, PersistenceResult, WriteStep};
pub use host::PersistenceHost;
pub use sink::{validate_db_name, FileSnapshotStore, SaveOutcome, SaveRequest, SnapshotSink};
