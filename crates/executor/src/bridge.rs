//! Bridge facade
//!
//! [`Bridge`] is the caller-facing handle: one async method per command.
//! Each call generates a request id, registers a continuation with the
//! correlator, hands the command to the queue (which either holds it for
//! batching or sends it straight away) and awaits the answer.
//!
//! A background pump task reads the channel's inbound events and resolves
//! continuations. When the execution context terminates every pending
//! request is rejected with [`Error::Channel`].
//!
//! # Example
//!
//! ```ignore
//! let (client, context) = cairn_engine::duplex();
//! let _ctx = ExecutionContext::ephemeral(context)?;
//! let bridge = Bridge::connect(client, BridgeConfig::default());
//!
//! bridge.init(None).await?;
//! bridge.execute("CREATE TABLE t (x INTEGER)", vec![]).await?;
//! let rows = bridge.query("SELECT x FROM t", vec![]).await?;
//! ```

use std::sync::Arc;
use std::time::Duration;

use cairn_core::{
    Command, CommandMessage, EngineResult, ExecuteResult, Output, PingInfo, QueryResult,
    Statement, Value,
};
use cairn_engine::{CairnConfig, ChannelEvent, ClientEnd, CommandSender, EventReceiver};
use tokio::sync::oneshot;
use tracing::{debug, info};

use crate::correlator::{Continuation, Correlator};
use crate::error::{Error, Result};
use crate::queue::{CommandQueue, QueueConfig};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Caller-side settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Read batching
    pub queue: QueueConfig,
    /// Per-request timeout; `None` waits until the channel fails
    pub request_timeout: Option<Duration>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
        }
    }
}

impl From<&CairnConfig> for BridgeConfig {
    fn from(config: &CairnConfig) -> Self {
        Self {
            queue: QueueConfig::from(config),
            request_timeout: config.request_timeout(),
        }
    }
}

struct BridgeInner {
    correlator: Arc<Correlator>,
    queue: Arc<CommandQueue>,
    request_timeout: Option<Duration>,
}

/// Async handle to one execution context. Cheap to clone; every clone
/// shares the same queue and pending-request table.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

impl Bridge {
    /// Attach to the client end of a channel and start the response pump.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(client: ClientEnd, config: BridgeConfig) -> Self {
        let (sender, events) = client.split();
        Self::from_parts(sender, events, config)
    }

    fn from_parts(sender: CommandSender, events: EventReceiver, config: BridgeConfig) -> Self {
        let correlator = Arc::new(Correlator::new());
        let queue = CommandQueue::new(config.queue, sender, Arc::clone(&correlator));
        tokio::spawn(pump(events, Arc::clone(&correlator)));

        Self {
            inner: Arc::new(BridgeInner {
                correlator,
                queue,
                request_timeout: config.request_timeout,
            }),
        }
    }

    /// Load a snapshot, or start with an empty store.
    pub async fn init(&self, snapshot: Option<Vec<u8>>) -> Result<()> {
        match self.request(Command::Init { snapshot }).await? {
            Output::Ready => Ok(()),
            other => Err(Error::unexpected("init", &other)),
        }
    }

    /// Run a read-only statement. Reads are batched.
    pub async fn query(&self, sql: impl Into<String>, params: Vec<Value>) -> Result<QueryResult> {
        match self
            .request(Command::Query {
                sql: sql.into(),
                params,
            })
            .await?
        {
            Output::Rows(rows) => Ok(rows),
            other => Err(Error::unexpected("query", &other)),
        }
    }

    /// Run a mutating statement. Never batched.
    pub async fn execute(
        &self,
        sql: impl Into<String>,
        params: Vec<Value>,
    ) -> Result<ExecuteResult> {
        match self
            .request(Command::Execute {
                sql: sql.into(),
                params,
            })
            .await?
        {
            Output::Changes(changes) => Ok(changes),
            other => Err(Error::unexpected("execute", &other)),
        }
    }

    /// Run several read-only statements; one result per statement, in order.
    pub async fn batch_query(
        &self,
        statements: Vec<Statement>,
        use_transaction: bool,
    ) -> Result<Vec<EngineResult<QueryResult>>> {
        let operations = statements.into_iter().map(Into::into).collect();
        match self
            .request(Command::BatchQuery {
                operations,
                use_transaction,
            })
            .await?
        {
            Output::Batch(items) => Ok(items.into_iter().map(|item| item.outcome).collect()),
            other => Err(Error::unexpected("batch_query", &other)),
        }
    }

    /// Serialize the whole store.
    pub async fn export(&self) -> Result<Vec<u8>> {
        match self.request(Command::Export).await? {
            Output::Snapshot { data } => Ok(data),
            other => Err(Error::unexpected("export", &other)),
        }
    }

    /// Liveness check.
    pub async fn ping(&self) -> Result<PingInfo> {
        match self.request(Command::Ping).await? {
            Output::Pong(info) => Ok(info),
            other => Err(Error::unexpected("ping", &other)),
        }
    }

    /// Final flush and teardown of the execution context.
    pub async fn close(&self) -> Result<()> {
        match self.request(Command::Close).await? {
            Output::Closed => {
                info!(target: "cairn::bridge", "Execution context closed");
                Ok(())
            }
            other => Err(Error::unexpected("close", &other)),
        }
    }

    /// Send any queued reads now instead of waiting for the window.
    pub fn flush_queue(&self) {
        self.inner.queue.flush();
    }

    /// Requests registered and not yet answered.
    pub fn pending_requests(&self) -> usize {
        self.inner.correlator.pending_count()
    }

    /// Why the channel terminated, once it has.
    pub fn terminated(&self) -> Option<String> {
        self.inner.correlator.terminated()
    }

    async fn request(&self, command: Command) -> Result<Output> {
        let message = CommandMessage::new(command);
        let id = message.id;
        let (tx, rx) = oneshot::channel();
        self.inner
            .correlator
            .register(id, Continuation::Caller(tx))?;
        self.inner.queue.submit(message);

        let answer = async {
            rx.await
                .unwrap_or_else(|_| Err(Error::channel("response continuation dropped")))
        };

        match self.inner.request_timeout {
            None => answer.await,
            Some(limit) => match tokio::time::timeout(limit, answer).await {
                Ok(result) => result,
                Err(_) => {
                    let waited_ms = self
                        .inner
                        .correlator
                        .forget(id)
                        .map(|waited| waited.as_millis() as u64);
                    debug!(target: "cairn::bridge", %id, ?waited_ms, "Request timed out");
                    Err(Error::Timeout {
                        id,
                        timeout_ms: limit.as_millis() as u64,
                    })
                }
            },
        }
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("pending", &self.pending_requests())
            .field("queued", &self.inner.queue.len())
            .field("terminated", &self.terminated())
            .finish()
    }
}

async fn pump(mut events: EventReceiver, correlator: Arc<Correlator>) {
    while let Some(event) = events.recv().await {
        match event {
            ChannelEvent::Response(response) => correlator.resolve(response),
            ChannelEvent::Terminated { reason } => {
                debug!(target: "cairn::bridge", %reason, "Channel terminated");
                correlator.reject_all(&reason);
            }
        }
    }
    correlator.reject_all("command channel closed");
}
