//! Database execution context
//!
//! One dedicated OS thread owns the [`Store`] and processes commands one at
//! a time, end to end. The same thread drives the persistence controller:
//! it waits with `select!` on the next command, the next flush completion
//! and the debounce deadline, so mutations, flush bookkeeping and timers
//! are all serialized without locks.
//!
//! # Thread Lifecycle
//!
//! - `close` waits for the in-flight flush, flushes once more if dirty,
//!   stops the persistence host, replies, and exits
//! - Dropping every [`CommandSender`](crate::CommandSender) has the same
//!   effect, without the reply
//! - On exit (normal or panic) a `Terminated` event is emitted so callers
//!   never wait on a dead context

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use cairn_core::{
    Command, CommandMessage, EngineError, EngineResult, ErrorKind, Output, PingInfo,
    ResponseMessage,
};
use cairn_durability::{PersistenceError, PersistenceHost, SaveOutcome, SaveRequest, SnapshotSink};
use crossbeam_channel::{select, Receiver};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::channel::{ContextEnd, EventSender};
use crate::config::PersistenceConfig;
use crate::persistence::{FlushDecision, PersistenceController, PersistenceStatus, SharedStatus};
use crate::store::Store;

/// Failure to start or join an execution context.
#[derive(Debug, Error)]
pub enum ContextError {
    /// The engine thread could not be spawned
    #[error("failed to spawn execution context: {0}")]
    Spawn(#[source] std::io::Error),

    /// The persistence host could not be started
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// The engine thread panicked
    #[error("execution context panicked")]
    Panicked,
}

/// Handle to a running execution context.
///
/// Dropping the handle detaches the thread; it keeps running until every
/// command sender is gone or `close` is processed.
pub struct ExecutionContext {
    thread: Option<JoinHandle<()>>,
    status: Option<SharedStatus>,
}

impl ExecutionContext {
    /// Start a context whose store is never persisted.
    pub fn ephemeral(endpoint: ContextEnd) -> Result<Self, ContextError> {
        Self::start(endpoint, None)
    }

    /// Start a context that flushes its store through `sink`.
    pub fn persistent(
        endpoint: ContextEnd,
        sink: Arc<dyn SnapshotSink>,
        config: PersistenceConfig,
    ) -> Result<Self, ContextError> {
        let (done_tx, done_rx) = crossbeam_channel::unbounded();
        let host = PersistenceHost::spawn(sink, done_tx)?;
        let persistence = Persistence {
            controller: PersistenceController::new(config),
            host: Some(host),
            completions: done_rx,
        };
        Self::start(endpoint, Some(persistence))
    }

    fn start(endpoint: ContextEnd, persistence: Option<Persistence>) -> Result<Self, ContextError> {
        let status = persistence.as_ref().map(|p| p.controller.status_handle());
        let worker = Worker {
            commands: endpoint.commands,
            events: endpoint.events,
            store: None,
            persistence,
        };
        let thread = thread::Builder::new()
            .name("cairn-engine".to_string())
            .spawn(move || worker.run())
            .map_err(ContextError::Spawn)?;

        Ok(Self {
            thread: Some(thread),
            status,
        })
    }

    /// Current persistence status; `None` for ephemeral contexts.
    pub fn persistence_status(&self) -> Option<PersistenceStatus> {
        self.status.as_ref().map(|s| s.read().clone())
    }

    /// Shared status handle; `None` for ephemeral contexts.
    pub fn status_handle(&self) -> Option<SharedStatus> {
        self.status.clone()
    }

    /// Whether the engine thread has exited.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// Wait for the engine thread to exit.
    pub fn join(mut self) -> Result<(), ContextError> {
        match self.thread.take() {
            Some(handle) => handle.join().map_err(|_| ContextError::Panicked),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("persistent", &self.status.is_some())
            .field("finished", &self.is_finished())
            .finish()
    }
}

struct Persistence {
    controller: PersistenceController,
    host: Option<PersistenceHost>,
    completions: Receiver<SaveOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

struct Worker {
    commands: Receiver<CommandMessage>,
    events: EventSender,
    store: Option<Store>,
    persistence: Option<Persistence>,
}

impl Worker {
    fn run(mut self) {
        info!(
            target: "cairn::engine",
            persistent = self.persistence.is_some(),
            "Execution context started"
        );

        loop {
            let commands = self.commands.clone();
            let completions = match &self.persistence {
                Some(p) => p.completions.clone(),
                None => crossbeam_channel::never(),
            };
            let timer = match self.persistence.as_ref().and_then(|p| p.controller.deadline()) {
                Some(at) => crossbeam_channel::at(at),
                None => crossbeam_channel::never(),
            };

            select! {
                recv(commands) -> msg => match msg {
                    Ok(msg) => {
                        if self.handle(msg) == Flow::Stop {
                            break;
                        }
                    }
                    Err(_) => {
                        debug!(target: "cairn::engine", "All command senders dropped");
                        if let Err(e) = self.final_flush() {
                            error!(target: "cairn::engine", error = %e, "Final flush failed on implicit close");
                        }
                        break;
                    }
                },
                recv(completions) -> outcome => self.on_completion(outcome.ok()),
                recv(timer) -> _ => self.on_deadline(),
            }
        }

        info!(target: "cairn::engine", "Execution context stopped");
    }

    fn handle(&mut self, msg: CommandMessage) -> Flow {
        let started = Instant::now();
        let id = msg.id;
        let kind = msg.kind();

        let mut flow = Flow::Continue;
        let outcome = match msg.command {
            Command::Init { snapshot } => self.init(snapshot),
            Command::Query { sql, params } => {
                self.store().and_then(|s| s.query(&sql, &params)).map(Output::Rows)
            }
            Command::Execute { sql, params } => self
                .store()
                .and_then(|s| s.execute(&sql, &params))
                .map(Output::Changes),
            Command::BatchQuery {
                operations,
                use_transaction,
            } => self
                .store()
                .and_then(|s| s.batch_query(&operations, use_transaction))
                .map(Output::Batch),
            Command::Export => self
                .store()
                .and_then(|s| s.export())
                .map(|data| Output::Snapshot { data }),
            Command::Ping => Ok(Output::Pong(PingInfo {
                ready: self.store.is_some(),
                memory_usage: self.store.as_ref().map_or(0, |s| s.memory_usage()),
            })),
            Command::Close => {
                flow = Flow::Stop;
                self.final_flush().map(|()| Output::Closed)
            }
        };

        // A failed statement may still have changed the store (a script
        // that stops halfway), so every mutating command counts.
        if kind.is_mutation() {
            self.note_mutation();
        }

        let duration_us = started.elapsed().as_micros() as u64;
        let response = match outcome {
            Ok(output) => {
                debug!(target: "cairn::engine", %id, command = %kind, duration_us, "Command processed");
                ResponseMessage::success(id, output, duration_us)
            }
            Err(e) => {
                debug!(target: "cairn::engine", %id, command = %kind, duration_us, error = %e, "Command failed");
                ResponseMessage::failure(id, e, duration_us)
            }
        };

        if !self.events.respond(response) {
            warn!(target: "cairn::engine", %id, "Response dropped, no listener");
        }
        flow
    }

    fn store(&self) -> EngineResult<&Store> {
        self.store.as_ref().ok_or_else(EngineError::not_initialized)
    }

    fn init(&mut self, snapshot: Option<Vec<u8>>) -> EngineResult<Output> {
        if self.store.is_some() {
            return Err(EngineError::new(
                ErrorKind::AlreadyInitialized,
                "store is already initialized",
            ));
        }
        let store = match snapshot {
            Some(bytes) => Store::from_snapshot(&bytes)?,
            None => Store::open_empty()?,
        };
        self.store = Some(store);
        Ok(Output::Ready)
    }

    fn note_mutation(&mut self) {
        if self.store.is_none() {
            return;
        }
        if let Some(p) = self.persistence.as_mut() {
            p.controller.on_mutation(Instant::now());
        }
    }

    fn on_deadline(&mut self) {
        let (Some(store), Some(p)) = (self.store.as_ref(), self.persistence.as_mut()) else {
            return;
        };
        if p.controller.on_deadline(Instant::now()) == FlushDecision::StartFlush {
            flush_or_defer(store, p);
        }
    }

    fn on_completion(&mut self, outcome: Option<SaveOutcome>) {
        let Some(p) = self.persistence.as_mut() else {
            return;
        };
        let outcome = outcome.unwrap_or_else(|| {
            error!(target: "cairn::engine", "Persistence host exited unexpectedly");
            p.completions = crossbeam_channel::never();
            failed_outcome(&PersistenceError::HostStopped.to_string(), 0)
        });
        if !p.controller.is_flushing() {
            return;
        }
        let decision = p.controller.on_flush_complete(&outcome, Instant::now());
        if decision == FlushDecision::StartFlush {
            if let Some(store) = self.store.as_ref() {
                flush_or_defer(store, p);
            }
        }
    }

    /// Wait for the in-flight write, then flush synchronously if dirty and
    /// stop the host.
    fn final_flush(&mut self) -> EngineResult<()> {
        let Some(p) = self.persistence.as_mut() else {
            return Ok(());
        };

        while p.controller.is_flushing() {
            let outcome = p
                .completions
                .recv()
                .unwrap_or_else(|_| failed_outcome(&PersistenceError::HostStopped.to_string(), 0));
            // The follow-up flush, if requested, is the final flush below.
            let _ = p.controller.on_flush_complete(&outcome, Instant::now());
        }

        // Uncommitted work dies with the context; everything committed
        // before it must still reach the sink.
        if let Some(store) = self.store.as_ref() {
            match store.rollback_open_transaction() {
                Ok(true) => {
                    warn!(target: "cairn::engine", "Rolled back open transaction before final flush")
                }
                Ok(false) => {}
                Err(e) => {
                    error!(target: "cairn::engine", error = %e, "Rollback before final flush failed")
                }
            }
        }

        let mut result = Ok(());
        if let (true, Some(store)) = (p.controller.is_dirty(), self.store.as_ref()) {
            info!(target: "cairn::engine", "Final flush before close");
            start_flush(store, p);
            if p.controller.is_flushing() {
                let outcome = p
                    .completions
                    .recv()
                    .unwrap_or_else(|_| failed_outcome(&PersistenceError::HostStopped.to_string(), 0));
                p.controller.on_flush_complete(&outcome, Instant::now());
            }
            if p.controller.is_dirty() {
                let message = p
                    .controller
                    .status()
                    .last_error
                    .unwrap_or_else(|| "final flush failed".to_string());
                result = Err(EngineError::new(ErrorKind::Persistence, message));
            }
        }

        if let Some(host) = p.host.take() {
            host.shutdown();
        }
        result
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        let reason = if thread::panicking() {
            error!(target: "cairn::engine", "Execution context panicked");
            "execution context panicked"
        } else {
            "execution context closed"
        };
        self.events.terminate(reason);
    }
}

/// Start a flush unless a transaction is open. A deferred flush leaves the
/// store dirty; the statement that ends the transaction re-arms the deadline.
fn flush_or_defer(store: &Store, p: &mut Persistence) {
    if store.in_transaction() {
        debug!(target: "cairn::persist", "Transaction open, flush deferred");
        p.controller.flush_deferred();
        return;
    }
    start_flush(store, p);
}

/// Capture the store and hand it to the host. Failures to capture or to
/// submit are fed back to the controller as failed flushes.
fn start_flush(store: &Store, p: &mut Persistence) {
    let db_name = p.controller.config().db_name.clone();
    p.controller.flush_started();

    let failure = match (store.export(), p.host.as_ref()) {
        (Ok(bytes), Some(host)) => {
            let len = bytes.len();
            debug!(target: "cairn::persist", db = %db_name, bytes = len, "Flush started");
            match host.submit(SaveRequest {
                db_buffer: bytes,
                db_name,
            }) {
                Ok(()) => return,
                Err(e) => failed_outcome(&e.to_string(), len),
            }
        }
        (Ok(bytes), None) => failed_outcome(&PersistenceError::HostStopped.to_string(), bytes.len()),
        (Err(e), _) => failed_outcome(&e.to_string(), 0),
    };
    let _ = p.controller.on_flush_complete(&failure, Instant::now());
}

fn failed_outcome(message: &str, bytes: usize) -> SaveOutcome {
    SaveOutcome {
        success: false,
        error: Some(message.to_string()),
        path: None,
        bytes,
    }
}
