//! Crash-safe file replacement
//!
//! Uses the write-fsync-rename pattern so the target file is never observed
//! in a partially written state.
//!
//! # Crash Safety
//!
//! 1. Write to a temporary file (`.<name>.tmp`) in the same directory
//! 2. fsync the temporary file
//! 3. Atomic rename over the final path
//! 4. fsync the parent directory
//!
//! Either the previous complete file or the new complete file exists at the
//! target path; a crash can only leave a stray temporary file behind, which
//! [`cleanup_temp_files`] removes on the next open.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{PersistenceError, PersistenceResult, WriteStep};

const TEMP_PREFIX: &str = ".";
const TEMP_SUFFIX: &str = ".tmp";

/// Information about a completed atomic write
#[derive(Debug, Clone)]
pub struct AtomicWriteInfo {
    /// Final path of the file
    pub path: PathBuf,
    /// Bytes written
    pub bytes: usize,
}

/// Temporary path used while writing `name` inside `dir`.
pub fn temp_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}{}{}", TEMP_PREFIX, name, TEMP_SUFFIX))
}

/// Replace `dir/name` with `data` atomically.
///
/// The directory is created if missing. A temporary file left over from a
/// crashed write is truncated and reused.
pub fn write_atomic(dir: &Path, name: &str, data: &[u8]) -> PersistenceResult<AtomicWriteInfo> {
    std::fs::create_dir_all(dir).map_err(|e| PersistenceError::io(WriteStep::CreateDir, dir, e))?;

    let final_path = dir.join(name);
    let temp = temp_path(dir, name);

    // Step 1: Write to temporary file
    let mut file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(&temp)
        .map_err(|e| PersistenceError::io(WriteStep::WriteTemp, &temp, e))?;
    file.write_all(data)
        .map_err(|e| PersistenceError::io(WriteStep::WriteTemp, &temp, e))?;

    // Step 2: fsync the file
    file.sync_all()
        .map_err(|e| PersistenceError::io(WriteStep::SyncTemp, &temp, e))?;
    drop(file);

    // Step 3: Atomic rename
    if let Err(e) = std::fs::rename(&temp, &final_path) {
        let _ = std::fs::remove_file(&temp);
        return Err(PersistenceError::io(WriteStep::Rename, &final_path, e));
    }

    // Step 4: fsync parent directory
    sync_dir(dir)?;

    Ok(AtomicWriteInfo {
        path: final_path,
        bytes: data.len(),
    })
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> PersistenceResult<()> {
    let handle = File::open(dir).map_err(|e| PersistenceError::io(WriteStep::SyncDir, dir, e))?;
    handle
        .sync_all()
        .map_err(|e| PersistenceError::io(WriteStep::SyncDir, dir, e))
}

// Directory handles cannot be fsynced on Windows; rename is already durable there.
#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> PersistenceResult<()> {
    Ok(())
}

/// Remove temporary files left behind by crashed writes.
///
/// Returns the number of files removed.
pub fn cleanup_temp_files(dir: &Path) -> PersistenceResult<usize> {
    let mut count = 0;

    if !dir.exists() {
        return Ok(0);
    }

    let entries =
        std::fs::read_dir(dir).map_err(|e| PersistenceError::io(WriteStep::Cleanup, dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| PersistenceError::io(WriteStep::Cleanup, dir, e))?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with(TEMP_PREFIX) && name.ends_with(TEMP_SUFFIX) && name.len() > 5 {
            std::fs::remove_file(entry.path())
                .map_err(|e| PersistenceError::io(WriteStep::Cleanup, entry.path(), e))?;
            count += 1;
        }
    }

    Ok(count)
}
