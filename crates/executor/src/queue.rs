//! Command queue / read batcher
//!
//! Queued commands are held for a short window so bursts of reads cross the
//! channel as one `batch_query`. The window timer is armed by the first
//! insertion only; reaching `max_batch_size` flushes immediately.
//!
//! On flush:
//! - one command is sent as-is
//! - several `query` commands are merged into one `batch_query` whose
//!   operations carry the callers' ids as correlation ids
//! - any other mix is sent command by command
//!
//! Commands that skip the queue (`init`, `ping`, `close`, `execute`) first
//! flush whatever is queued, under the same lock, so the channel always sees
//! commands in submission order.

use std::sync::{Arc, Weak};
use std::time::Duration;

use cairn_core::{BatchOperation, Command, CommandKind, CommandMessage, RequestId};
use cairn_engine::{CairnConfig, CommandSender};
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::correlator::{Continuation, Correlator};
use crate::error::Error;

/// Batching settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// How long the first queued command waits for company
    pub window: Duration,
    /// Queue length that triggers an immediate flush
    pub max_batch_size: usize,
    /// Run merged reads inside one read transaction
    pub use_transaction: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_millis(50),
            max_batch_size: 50,
            use_transaction: true,
        }
    }
}

impl From<&CairnConfig> for QueueConfig {
    fn from(config: &CairnConfig) -> Self {
        Self {
            window: Duration::from_millis(config.batch_window_ms),
            max_batch_size: config.max_batch_size.max(1),
            use_transaction: config.batch_use_transaction,
        }
    }
}

#[derive(Default)]
struct QueueState {
    pending: Vec<CommandMessage>,
    timer: Option<JoinHandle<()>>,
    /// Bumped every time a timer is armed; a woken timer whose generation
    /// no longer matches was superseded and must not flush.
    generation: u64,
}

/// Holds batchable commands until the window closes.
pub(crate) struct CommandQueue {
    config: QueueConfig,
    sender: CommandSender,
    correlator: Arc<Correlator>,
    state: Mutex<QueueState>,
}

impl CommandQueue {
    pub(crate) fn new(
        config: QueueConfig,
        sender: CommandSender,
        correlator: Arc<Correlator>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            sender,
            correlator,
            state: Mutex::new(QueueState::default()),
        })
    }

    /// Route a command that is already registered with the correlator.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn submit(self: &Arc<Self>, message: CommandMessage) {
        let mut state = self.state.lock();

        if message.kind().skips_batch() {
            let queued = self.take_pending(&mut state);
            self.dispatch(queued);
            self.send(message);
            return;
        }

        state.pending.push(message);
        trace!(target: "cairn::queue", queued = state.pending.len(), "Command queued");

        if state.pending.len() >= self.config.max_batch_size {
            let queued = self.take_pending(&mut state);
            self.dispatch(queued);
        } else if state.timer.is_none() {
            state.generation += 1;
            let generation = state.generation;
            let weak = Arc::downgrade(self);
            let window = self.config.window;
            state.timer = Some(tokio::spawn(async move {
                tokio::time::sleep(window).await;
                flush_from_timer(weak, generation);
            }));
        }
    }

    /// Send everything queued now.
    pub(crate) fn flush(&self) {
        let mut state = self.state.lock();
        let queued = self.take_pending(&mut state);
        self.dispatch(queued);
    }

    /// Number of commands waiting for the window.
    pub(crate) fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    fn take_pending(&self, state: &mut QueueState) -> Vec<CommandMessage> {
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        std::mem::take(&mut state.pending)
    }

    fn dispatch(&self, mut batch: Vec<CommandMessage>) {
        match batch.len() {
            0 => {}
            1 => {
                if let Some(message) = batch.pop() {
                    self.send(message);
                }
            }
            n if batch.iter().all(|m| m.kind() == CommandKind::Query) => {
                let ids: Vec<RequestId> = batch.iter().map(|m| m.id).collect();
                let operations = batch
                    .into_iter()
                    .filter_map(|m| match m.command {
                        Command::Query { sql, params } => Some(BatchOperation {
                            sql,
                            params,
                            correlation_id: Some(m.id),
                        }),
                        _ => None,
                    })
                    .collect();
                let merged = CommandMessage::new(Command::BatchQuery {
                    operations,
                    use_transaction: self.config.use_transaction,
                });
                debug!(target: "cairn::queue", batch_id = %merged.id, size = n, "Merged reads into one batch");

                if let Err(e) = self
                    .correlator
                    .register(merged.id, Continuation::Fanout(ids.clone()))
                {
                    for id in ids {
                        self.correlator.fail(id, e.clone());
                    }
                    return;
                }
                self.send(merged);
            }
            n => {
                debug!(target: "cairn::queue", size = n, "Flushing mixed commands individually");
                for message in batch {
                    self.send(message);
                }
            }
        }
    }

    fn send(&self, message: CommandMessage) {
        let id = message.id;
        if let Err(e) = self.sender.send(message) {
            self.correlator.fail(id, Error::channel(e.to_string()));
        }
    }
}

fn flush_from_timer(queue: Weak<CommandQueue>, generation: u64) {
    let Some(queue) = queue.upgrade() else {
        return;
    };
    let mut state = queue.state.lock();
    // Woke up after the queue was drained, and possibly re-armed, by
    // someone else while this task waited for the lock.
    if state.timer.is_none() || state.generation != generation {
        trace!(target: "cairn::queue", generation, "Stale batch timer ignored");
        return;
    }
    // This task is the armed timer; clear it without aborting ourselves.
    state.timer = None;
    let queued = std::mem::take(&mut state.pending);
    queue.dispatch(queued);
}
