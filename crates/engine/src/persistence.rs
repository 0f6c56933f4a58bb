//! Debounced persistence controller
//!
//! Decides *when* the store is flushed. It owns no thread and no timer: the
//! execution context feeds it events (mutation, deadline reached, flush
//! completed) with an explicit `now`, and it answers with a
//! [`FlushDecision`]. The context arms its wait on [`deadline`].
//!
//! ```text
//!            mutation                deadline
//!   Idle ─────────────▶ Dirty ─────────────────▶ Flushing
//!    ▲                    ▲                         │  │
//!    │   ok, clean        │ ok, dirty / failed      │  │ deadline
//!    └────────────────────┴─────────────────────────┘  ▼
//!                                       Flushing+PendingDirty
//!                                              │ complete
//!                                              ▼
//!                                   flush again immediately
//! ```
//!
//! At most one flush is in flight. Starting a flush clears `dirty`, since
//! the captured image covers every mutation applied so far.
//!
//! [`deadline`]: PersistenceController::deadline

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use cairn_durability::SaveOutcome;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::{PersistenceConfig, RetryPolicy};

/// What the execution context should do after feeding an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushDecision {
    /// Nothing to do now
    Wait,
    /// Serialize the store and hand it to the persistence host
    StartFlush,
}

/// Controller state, as described by the flags it keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistencePhase {
    /// Nothing unflushed
    Idle,
    /// Unflushed mutations, waiting for the quiet period
    Dirty,
    /// A write is in flight
    Flushing,
    /// A write is in flight and another one was requested
    FlushingPendingDirty,
}

/// Snapshot of persistence health, readable without a round trip to the
/// execution context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PersistenceStatus {
    /// Mutations exist that no completed flush covers
    pub dirty: bool,
    /// A write is in flight
    pub flushing: bool,
    /// A deadline fired during the in-flight write
    pub pending_flush_requested: bool,
    /// Flushes handed to the host
    pub flushes_started: u64,
    /// Flushes the host reported durable
    pub flushes_completed: u64,
    /// Flushes that failed
    pub flushes_failed: u64,
    /// Deadlines that passed while a transaction was open
    pub flushes_deferred: u64,
    /// Failures since the last success
    pub consecutive_failures: u32,
    /// Wall-clock time of the last durable flush
    pub last_flush_at: Option<DateTime<Utc>>,
    /// Message of the most recent failure, cleared on success
    pub last_error: Option<String>,
    /// Size of the last durable snapshot
    pub last_snapshot_bytes: Option<usize>,
    /// Location of the last durable snapshot
    pub last_snapshot_path: Option<PathBuf>,
}

impl PersistenceStatus {
    /// Whether every applied mutation is covered by a durable snapshot.
    pub fn is_clean(&self) -> bool {
        !self.dirty && !self.flushing
    }
}

/// Shared, read-mostly view of [`PersistenceStatus`].
pub type SharedStatus = Arc<RwLock<PersistenceStatus>>;

/// Debounce and single-flight state machine.
#[derive(Debug)]
pub struct PersistenceController {
    config: PersistenceConfig,
    dirty: bool,
    flushing: bool,
    pending_flush_requested: bool,
    deadline: Option<Instant>,
    status: SharedStatus,
}

impl PersistenceController {
    /// Create an idle controller.
    pub fn new(config: PersistenceConfig) -> Self {
        Self {
            config,
            dirty: false,
            flushing: false,
            pending_flush_requested: false,
            deadline: None,
            status: Arc::new(RwLock::new(PersistenceStatus::default())),
        }
    }

    /// Settings in use.
    pub fn config(&self) -> &PersistenceConfig {
        &self.config
    }

    /// Handle to the published status.
    pub fn status_handle(&self) -> SharedStatus {
        Arc::clone(&self.status)
    }

    /// Copy of the current status.
    pub fn status(&self) -> PersistenceStatus {
        self.status.read().clone()
    }

    /// When the next deadline fires, if one is armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Whether unflushed mutations exist.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Whether a write is in flight.
    pub fn is_flushing(&self) -> bool {
        self.flushing
    }

    /// Current phase.
    pub fn phase(&self) -> PersistencePhase {
        match (self.flushing, self.pending_flush_requested, self.dirty) {
            (true, true, _) => PersistencePhase::FlushingPendingDirty,
            (true, false, _) => PersistencePhase::Flushing,
            (false, _, true) => PersistencePhase::Dirty,
            (false, _, false) => PersistencePhase::Idle,
        }
    }

    /// A mutating command ran. Restarts the quiet period.
    pub fn on_mutation(&mut self, now: Instant) {
        self.dirty = true;
        self.deadline = Some(now + self.config.debounce);
        self.publish(|_| {});
    }

    /// The armed deadline was reached.
    pub fn on_deadline(&mut self, _now: Instant) -> FlushDecision {
        self.deadline = None;
        if self.flushing {
            if self.dirty {
                debug!(target: "cairn::persist", "Deadline during flush, queueing another flush");
                self.pending_flush_requested = true;
                self.publish(|_| {});
            }
            return FlushDecision::Wait;
        }
        if self.dirty {
            FlushDecision::StartFlush
        } else {
            FlushDecision::Wait
        }
    }

    /// A flush was due but the store cannot be captured yet. Stays dirty
    /// with no deadline; the next mutation arms a new one. Not a failure.
    pub fn flush_deferred(&mut self) {
        self.deadline = None;
        self.publish(|s| s.flushes_deferred += 1);
    }

    /// The store image was captured and handed to the host.
    pub fn flush_started(&mut self) {
        self.flushing = true;
        self.dirty = false;
        self.deadline = None;
        self.publish(|s| s.flushes_started += 1);
    }

    /// The host reported the outcome of the in-flight write.
    pub fn on_flush_complete(&mut self, outcome: &SaveOutcome, now: Instant) -> FlushDecision {
        self.flushing = false;

        if outcome.success {
            self.publish(|s| {
                s.flushes_completed += 1;
                s.consecutive_failures = 0;
                s.last_flush_at = Some(Utc::now());
                s.last_error = None;
                s.last_snapshot_bytes = Some(outcome.bytes);
                s.last_snapshot_path = outcome.path.clone();
            });

            if std::mem::take(&mut self.pending_flush_requested) && self.dirty {
                self.publish(|_| {});
                return FlushDecision::StartFlush;
            }
            if self.dirty && self.deadline.is_none() {
                self.deadline = Some(now + self.config.debounce);
            }
            self.publish(|_| {});
            return FlushDecision::Wait;
        }

        // The captured mutations are not durable; they are dirty again.
        self.dirty = true;
        let pending = std::mem::take(&mut self.pending_flush_requested);
        let message = outcome
            .error
            .clone()
            .unwrap_or_else(|| "unknown persistence failure".to_string());
        let failures = {
            let mut status = self.status.write();
            status.flushes_failed += 1;
            status.consecutive_failures += 1;
            status.last_error = Some(message.clone());
            status.consecutive_failures
        };

        match self.config.retry {
            RetryPolicy::Backoff { .. } => {
                let delay = self.config.retry.delay(failures).unwrap_or(self.config.debounce);
                let retry_at = now + delay;
                self.deadline = Some(match self.deadline {
                    Some(existing) if existing > retry_at => existing,
                    _ => retry_at,
                });
            }
            RetryPolicy::NextMutation => {
                if pending {
                    self.deadline = Some(now + self.config.debounce);
                }
            }
        }

        warn!(
            target: "cairn::persist",
            error = %message,
            consecutive_failures = failures,
            retry_in_ms = self.deadline.map(|d| d.saturating_duration_since(now).as_millis() as u64),
            "Flush failed, store remains dirty"
        );
        self.publish(|_| {});
        FlushDecision::Wait
    }

    fn publish(&self, update: impl FnOnce(&mut PersistenceStatus)) {
        let mut status = self.status.write();
        update(&mut status);
        status.dirty = self.dirty;
        status.flushing = self.flushing;
        status.pending_flush_requested = self.pending_flush_requested;
    }
}
