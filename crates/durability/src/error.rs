//! Persistence error types

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for persistence operations
pub type PersistenceResult<T> = std::result::Result<T, PersistenceError>;

/// A flush (or snapshot load) could not complete.
///
/// Flush failures are never surfaced to individual callers: they are logged,
/// recorded in the persistence status, and retried.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// A filesystem step failed
    #[error("{step} failed for {}: {source}", path.display())]
    Io {
        /// Which step of the atomic write failed
        step: WriteStep,
        /// File or directory involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Database name would escape the data directory
    #[error("invalid database name '{name}': {reason}")]
    InvalidName {
        /// Offending name
        name: String,
        /// Why it was rejected
        reason: &'static str,
    },

    /// The persistence host thread is gone
    #[error("persistence host stopped")]
    HostStopped,

    /// The persistence host thread could not be started
    #[error("failed to spawn persistence host: {0}")]
    Spawn(#[source] io::Error),

    /// Injected by a test sink
    #[error("injected failure: {0}")]
    Injected(String),
}

/// Steps of the temp-write / fsync / rename sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStep {
    /// Creating the data directory
    CreateDir,
    /// Creating or writing the temporary file
    WriteTemp,
    /// fsync of the temporary file
    SyncTemp,
    /// Rename over the target
    Rename,
    /// fsync of the parent directory
    SyncDir,
    /// Reading an existing snapshot
    Read,
    /// Removing leftover temporary files
    Cleanup,
}

impl std::fmt::Display for WriteStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WriteStep::CreateDir => "create dir",
            WriteStep::WriteTemp => "write temp file",
            WriteStep::SyncTemp => "fsync temp file",
            WriteStep::Rename => "rename",
            WriteStep::SyncDir => "fsync dir",
            WriteStep::Read => "read",
            WriteStep::Cleanup => "cleanup",
        };
        f.write_str(s)
    }
}

impl PersistenceError {
    pub(crate) fn io(step: WriteStep, path: impl Into<PathBuf>, source: io::Error) -> Self {
        PersistenceError::Io {
            step,
            path: path.into(),
            source,
        }
    }
}
