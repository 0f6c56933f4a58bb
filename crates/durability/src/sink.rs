//! Snapshot sinks
//!
//! A [`SnapshotSink`] is the host-side primitive that makes a serialized
//! store durable. The engine never touches files itself; it pushes a
//! [`SaveRequest`] and later learns the [`SaveOutcome`] out-of-band.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::atomic::{cleanup_temp_files, write_atomic};
use crate::error::{PersistenceError, PersistenceResult, WriteStep};

/// One-way push from the engine: "make these bytes durable under this name".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveRequest {
    /// Serialized store
    pub db_buffer: Vec<u8>,
    /// Logical database name (file name inside the data directory)
    pub db_name: String,
}

/// Host report for one [`SaveRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveOutcome {
    /// Whether the snapshot is now durable
    pub success: bool,
    /// Failure description when `success` is false
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Final path of the snapshot when `success` is true
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Size of the snapshot that was written (or attempted)
    pub bytes: usize,
}

impl SaveOutcome {
    /// Outcome for a completed write.
    pub fn saved(path: PathBuf, bytes: usize) -> Self {
        Self {
            success: true,
            error: None,
            path: Some(path),
            bytes,
        }
    }

    /// Outcome for a failed write.
    pub fn failed(error: &PersistenceError, bytes: usize) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
            path: None,
            bytes,
        }
    }
}

/// Durable storage for whole-store snapshots.
///
/// Implementations must make `save` atomic: after it returns `Ok`, `load`
/// yields exactly the saved bytes; after it returns `Err`, `load` yields the
/// previous snapshot (or nothing), never a partial one.
pub trait SnapshotSink: Send + Sync + 'static {
    /// Persist a snapshot. Returns the location written.
    fn save(&self, request: &SaveRequest) -> PersistenceResult<PathBuf>;

    /// Read the latest snapshot for `db_name`, if any.
    fn load(&self, db_name: &str) -> PersistenceResult<Option<Vec<u8>>>;
}

/// Validate that a database name is a plain file name.
pub fn validate_db_name(name: &str) -> PersistenceResult<()> {
    let reject = |reason| {
        Err(PersistenceError::InvalidName {
            name: name.to_string(),
            reason,
        })
    };
    if name.is_empty() {
        return reject("empty");
    }
    if name.starts_with('.') {
        return reject("must not start with '.'");
    }
    if name.contains('/') || name.contains('\\') {
        return reject("must not contain path separators");
    }
    Ok(())
}

/// Snapshot sink backed by files in one directory.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    /// Create a store rooted at `dir`. The directory is created lazily.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Data directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the snapshot for `db_name`.
    pub fn snapshot_path(&self, db_name: &str) -> PathBuf {
        self.dir.join(db_name)
    }

    /// Remove temporary files left by crashed writes.
    pub fn cleanup(&self) -> PersistenceResult<usize> {
        cleanup_temp_files(&self.dir)
    }
}

impl SnapshotSink for FileSnapshotStore {
    fn save(&self, request: &SaveRequest) -> PersistenceResult<PathBuf> {
        validate_db_name(&request.db_name)?;
        let info = write_atomic(&self.dir, &request.db_name, &request.db_buffer)?;
        Ok(info.path)
    }

    fn load(&self, db_name: &str) -> PersistenceResult<Option<Vec<u8>>> {
        validate_db_name(db_name)?;
        let path = self.snapshot_path(db_name);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PersistenceError::io(WriteStep::Read, path, e)),
        }
    }
}
