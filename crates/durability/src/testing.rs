//! Testing utilities for persistence
//!
//! [`RecordingSink`] is an in-memory [`SnapshotSink`] that records every
//! save with its timestamp, can fail on demand, and can hold writes open
//! so tests can observe the "flush in flight" state deterministically.
//!
//! # Example
//!
//! ```ignore
//! use cairn_durability::testing::RecordingSink;
//!
//! let sink = RecordingSink::new();
//! sink.fail_next(1);     // next save fails
//! sink.hold();           // saves block until release()
//! ```

use std::path::PathBuf;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::{PersistenceError, PersistenceResult};
use crate::sink::{SaveRequest, SnapshotSink};

/// One recorded save.
#[derive(Debug, Clone)]
pub struct SaveRecord {
    /// Bytes that were saved
    pub bytes: Vec<u8>,
    /// Database name
    pub db_name: String,
    /// When the save started
    pub started_at: Instant,
}

#[derive(Default)]
struct SinkState {
    saves: Vec<SaveRecord>,
    failures_left: usize,
    attempts: usize,
    held: bool,
    in_write: bool,
}

/// In-memory sink for tests.
#[derive(Default)]
pub struct RecordingSink {
    state: Mutex<SinkState>,
    changed: Condvar,
}

impl RecordingSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `n` saves.
    pub fn fail_next(&self, n: usize) {
        self.state.lock().failures_left = n;
    }

    /// Block subsequent saves until [`release`](Self::release).
    pub fn hold(&self) {
        self.state.lock().held = true;
    }

    /// Let held saves proceed.
    pub fn release(&self) {
        let mut state = self.state.lock();
        state.held = false;
        self.changed.notify_all();
    }

    /// Wait until a save is blocked inside the sink.
    pub fn wait_for_write_in_progress(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while !state.in_write {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                return state.in_write;
            }
        }
        true
    }

    /// Wait until at least `n` successful saves have been recorded.
    pub fn wait_for_saves(&self, n: usize, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        while state.saves.len() < n {
            if self.changed.wait_until(&mut state, deadline).timed_out() {
                return state.saves.len() >= n;
            }
        }
        true
    }

    /// Successful saves so far.
    pub fn saves(&self) -> Vec<SaveRecord> {
        self.state.lock().saves.clone()
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.state.lock().saves.len()
    }

    /// Number of save attempts, including failed ones.
    pub fn attempt_count(&self) -> usize {
        self.state.lock().attempts
    }

    /// Bytes of the latest successful save.
    pub fn latest(&self) -> Option<Vec<u8>> {
        self.state.lock().saves.last().map(|r| r.bytes.clone())
    }
}

impl SnapshotSink for RecordingSink {
    fn save(&self, request: &SaveRequest) -> PersistenceResult<PathBuf> {
        let started_at = Instant::now();
        let mut state = self.state.lock();
        state.attempts += 1;
        state.in_write = true;
        self.changed.notify_all();
        while state.held {
            self.changed.wait(&mut state);
        }
        state.in_write = false;

        if state.failures_left > 0 {
            state.failures_left -= 1;
            self.changed.notify_all();
            return Err(PersistenceError::Injected("sink configured to fail".into()));
        }

        state.saves.push(SaveRecord {
            bytes: request.db_buffer.clone(),
            db_name: request.db_name.clone(),
            started_at,
        });
        self.changed.notify_all();
        Ok(PathBuf::from(format!("memory://{}", request.db_name)))
    }

    fn load(&self, db_name: &str) -> PersistenceResult<Option<Vec<u8>>> {
        Ok(self
            .state
            .lock()
            .saves
            .iter()
            .rev()
            .find(|r| r.db_name == db_name)
            .map(|r| r.bytes.clone()))
    }
}
