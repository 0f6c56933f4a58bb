//! Persistence host
//!
//! Background thread that owns the physical snapshot writes. The engine
//! pushes [`SaveRequest`]s over a one-way channel; each request is written
//! through the configured [`SnapshotSink`] and its [`SaveOutcome`] is sent
//! back on a separate completion channel that the engine selects on.
//!
//! # Thread Lifecycle
//!
//! - Dropping the request sender ends the loop after in-flight work
//! - [`PersistenceHost::shutdown`] drops the sender and joins the thread
//! - `Drop` does the same, so the thread never outlives its owner

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error, info};

use crate::error::{PersistenceError, PersistenceResult};
use crate::sink::{SaveOutcome, SaveRequest, SnapshotSink};

/// Handle to the persistence host thread.
pub struct PersistenceHost {
    requests: Option<Sender<SaveRequest>>,
    thread: Option<JoinHandle<()>>,
}

impl PersistenceHost {
    /// Spawn the host thread.
    ///
    /// Outcomes are sent to `completions`. The host stops when the handle is
    /// shut down or when `completions` has no receiver left.
    pub fn spawn(
        sink: Arc<dyn SnapshotSink>,
        completions: Sender<SaveOutcome>,
    ) -> PersistenceResult<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let thread = thread::Builder::new()
            .name("cairn-persist".to_string())
            .spawn(move || run_host(sink, rx, completions))
            .map_err(PersistenceError::Spawn)?;

        Ok(Self {
            requests: Some(tx),
            thread: Some(thread),
        })
    }

    /// Queue a snapshot for writing.
    pub fn submit(&self, request: SaveRequest) -> PersistenceResult<()> {
        match &self.requests {
            Some(tx) => tx.send(request).map_err(|_| PersistenceError::HostStopped),
            None => Err(PersistenceError::HostStopped),
        }
    }

    /// Stop accepting requests and wait for queued writes to finish.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.requests.take();
        if let Some(handle) = self.thread.take() {
            // Ignore join errors (sink might have panicked)
            let _ = handle.join();
        }
    }
}

impl Drop for PersistenceHost {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for PersistenceHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistenceHost")
            .field("running", &self.requests.is_some())
            .finish()
    }
}

fn run_host(
    sink: Arc<dyn SnapshotSink>,
    requests: Receiver<SaveRequest>,
    completions: Sender<SaveOutcome>,
) {
    for request in requests {
        let started = Instant::now();
        let bytes = request.db_buffer.len();
        let outcome = match sink.save(&request) {
            Ok(path) => {
                info!(
                    target: "cairn::persist",
                    db = %request.db_name,
                    bytes,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    path = %path.display(),
                    "Snapshot saved"
                );
                SaveOutcome::saved(path, bytes)
            }
            Err(e) => {
                error!(
                    target: "cairn::persist",
                    db = %request.db_name,
                    bytes,
                    error = %e,
                    "Snapshot save failed"
                );
                SaveOutcome::failed(&e, bytes)
            }
        };

        if completions.send(outcome).is_err() {
            debug!(target: "cairn::persist", "Completion receiver gone, host exiting");
            break;
        }
    }
}
