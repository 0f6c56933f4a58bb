//! Request correlator
//!
//! Maps request ids to the continuation waiting for them. The pump task
//! resolves entries as responses arrive; a terminated channel rejects every
//! entry at once. A merged read batch is registered under its own id as a
//! fan-out entry listing the caller ids it carries.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use cairn_core::{Output, RequestId, ResponseMessage};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// What to do with a response.
#[derive(Debug)]
pub(crate) enum Continuation {
    /// Hand the outcome to one waiting caller
    Caller(oneshot::Sender<Result<Output>>),
    /// Split a `Batch` output between these callers by correlation id
    Fanout(Vec<RequestId>),
}

#[derive(Debug)]
struct Pending {
    continuation: Continuation,
    enqueued_at: Instant,
}

#[derive(Debug, Default)]
struct State {
    pending: HashMap<RequestId, Pending>,
    terminated: Option<String>,
}

/// Pending request table.
#[derive(Debug, Default)]
pub(crate) struct Correlator {
    state: Mutex<State>,
}

impl Correlator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Track `id`. Fails once the channel has terminated.
    pub(crate) fn register(&self, id: RequestId, continuation: Continuation) -> Result<()> {
        let mut state = self.state.lock();
        if let Some(reason) = &state.terminated {
            return Err(Error::channel(reason.clone()));
        }
        state.pending.insert(
            id,
            Pending {
                continuation,
                enqueued_at: Instant::now(),
            },
        );
        Ok(())
    }

    /// Deliver a response. Unknown ids are logged and dropped.
    pub(crate) fn resolve(&self, response: ResponseMessage) {
        let id = response.id;
        let continuation = self.take(id);
        match continuation {
            Some(Continuation::Caller(tx)) => {
                let _ = tx.send(response.outcome.map_err(Error::Engine));
            }
            Some(Continuation::Fanout(ids)) => self.fan_out(id, ids, response.outcome),
            None => {
                warn!(target: "cairn::bridge", %id, "Protocol error: response for unknown request dropped");
            }
        }
    }

    /// Fail one request (and the members of a fan-out entry).
    pub(crate) fn fail(&self, id: RequestId, error: Error) {
        let continuation = self.take(id);
        match continuation {
            Some(Continuation::Caller(tx)) => {
                let _ = tx.send(Err(error));
            }
            Some(Continuation::Fanout(ids)) => {
                for member in ids {
                    self.fail(member, error.clone());
                }
            }
            None => {}
        }
    }

    /// Reject every pending request and refuse new registrations.
    pub(crate) fn reject_all(&self, reason: &str) {
        let drained: Vec<Pending> = {
            let mut state = self.state.lock();
            if state.terminated.is_none() {
                state.terminated = Some(reason.to_string());
            }
            state.pending.drain().map(|(_, p)| p).collect()
        };

        let mut rejected = 0usize;
        let mut oldest = Duration::ZERO;
        for pending in drained {
            if let Continuation::Caller(tx) = pending.continuation {
                let _ = tx.send(Err(Error::channel(reason)));
                rejected += 1;
                oldest = oldest.max(pending.enqueued_at.elapsed());
            }
        }
        if rejected > 0 {
            warn!(
                target: "cairn::bridge",
                rejected,
                reason,
                oldest_ms = oldest.as_millis() as u64,
                "Rejected pending requests"
            );
        }
    }

    /// Drop `id` without answering it. Returns how long it had been
    /// pending, or `None` if it was not.
    pub(crate) fn forget(&self, id: RequestId) -> Option<Duration> {
        self.state
            .lock()
            .pending
            .remove(&id)
            .map(|p| p.enqueued_at.elapsed())
    }

    fn take(&self, id: RequestId) -> Option<Continuation> {
        self.state.lock().pending.remove(&id).map(|p| p.continuation)
    }

    /// Number of tracked entries, fan-out entries included.
    pub(crate) fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// Termination reason, once the channel is gone.
    pub(crate) fn terminated(&self) -> Option<String> {
        self.state.lock().terminated.clone()
    }

    fn fan_out(
        &self,
        batch_id: RequestId,
        ids: Vec<RequestId>,
        outcome: std::result::Result<Output, cairn_core::EngineError>,
    ) {
        let items = match outcome {
            Ok(Output::Batch(items)) => items,
            Ok(other) => {
                let err = Error::unexpected("batch_query", &other);
                for id in ids {
                    self.fail(id, err.clone());
                }
                return;
            }
            Err(e) => {
                for id in ids {
                    self.fail(id, Error::Engine(e.clone()));
                }
                return;
            }
        };

        debug!(target: "cairn::bridge", %batch_id, size = items.len(), "Splitting batched response");
        let mut answered = Vec::with_capacity(items.len());
        for item in items {
            let Some(id) = item.correlation_id else {
                warn!(target: "cairn::bridge", %batch_id, "Batched result without correlation id dropped");
                continue;
            };
            match self.take(id) {
                Some(Continuation::Caller(tx)) => {
                    let _ = tx.send(item.outcome.map(Output::Rows).map_err(Error::Engine));
                }
                Some(other) => {
                    warn!(target: "cairn::bridge", %id, "Nested fan-out entry in batch dropped");
                    drop(other);
                }
                // Timed out and forgotten while the batch was in flight.
                None => {}
            }
            answered.push(id);
        }

        for id in ids.into_iter().filter(|id| !answered.contains(id)) {
            self.fail(
                id,
                Error::Internal {
                    reason: format!("no result for request in batch {}", batch_id),
                },
            );
        }
    }
}
