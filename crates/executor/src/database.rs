//! Database handle
//!
//! [`Cairn`] wires the whole stack together for the common case: a data
//! directory holding `cairn.toml` and one snapshot file.
//!
//! Opening a directory:
//! 1. Creates the directory and a commented `cairn.toml` if missing
//! 2. Removes temp files left behind by interrupted flushes
//! 3. Loads the latest snapshot, if any
//! 4. Spawns the execution context and its persistence host
//! 5. Connects a [`Bridge`] and sends `init`

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cairn_core::{EngineResult, ExecuteResult, PingInfo, QueryResult, Statement, Value};
use cairn_durability::{FileSnapshotStore, SaveRequest, SnapshotSink};
use cairn_engine::{
    duplex, CairnConfig, ExecutionContext, PersistenceStatus, SharedStatus, CONFIG_FILE_NAME,
};
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::bridge::{Bridge, BridgeConfig};
use crate::error::{Error, Result};

/// An open Cairn database.
///
/// Dropping the handle without calling [`close`](Self::close) still
/// flushes: once every bridge clone is gone the execution context performs
/// its final flush and exits on its own.
pub struct Cairn {
    bridge: Bridge,
    context: Mutex<Option<ExecutionContext>>,
    status: Option<SharedStatus>,
    data_dir: Option<PathBuf>,
    config: CairnConfig,
}

impl Cairn {
    /// Open (or create) the database in `dir`, reading `cairn.toml`.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).map_err(|e| Error::Persistence {
            reason: format!("cannot create data directory {}: {}", dir.display(), e),
        })?;
        let config_path = dir.join(CONFIG_FILE_NAME);
        CairnConfig::write_default_if_missing(&config_path)?;
        let config = CairnConfig::from_file(&config_path)?;
        Self::open_with_config(dir, config).await
    }

    /// Open (or create) the database in `dir` with an explicit config.
    /// `cairn.toml` is neither read nor written.
    pub async fn open_with_config(dir: impl AsRef<Path>, config: CairnConfig) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        config.validate()?;
        let persistence = config.persistence_config()?;

        let store = FileSnapshotStore::new(&dir);
        let removed = store.cleanup()?;
        if removed > 0 {
            warn!(target: "cairn::bridge", removed, dir = %dir.display(), "Removed leftover temp files");
        }
        let snapshot = store.load(&persistence.db_name)?;
        info!(
            target: "cairn::bridge",
            dir = %dir.display(),
            db = %persistence.db_name,
            snapshot_bytes = snapshot.as_ref().map_or(0, |s| s.len()),
            "Opening database"
        );

        let (client, context) = duplex();
        let ctx = ExecutionContext::persistent(context, Arc::new(store), persistence)?;
        Self::start(client, ctx, Some(dir), config, snapshot).await
    }

    /// Open a database that lives only in memory.
    pub async fn ephemeral() -> Result<Self> {
        let (client, context) = duplex();
        let ctx = ExecutionContext::ephemeral(context)?;
        Self::start(client, ctx, None, CairnConfig::default(), None).await
    }

    /// Replace the snapshot stored in `dir` with `snapshot`.
    ///
    /// The bytes are loaded into a throwaway in-memory store first, so a
    /// corrupt file never reaches the data directory. The database must not
    /// be open while this runs.
    pub async fn import_snapshot(dir: impl AsRef<Path>, snapshot: Vec<u8>) -> Result<PathBuf> {
        let dir = dir.as_ref();
        let (client, context) = duplex();
        let ctx = ExecutionContext::ephemeral(context)?;
        let scratch = Self::start(client, ctx, None, CairnConfig::default(), Some(snapshot.clone()))
            .await?;
        scratch.close().await?;

        let config_path = dir.join(CONFIG_FILE_NAME);
        let config = if config_path.exists() {
            CairnConfig::from_file(&config_path)?
        } else {
            CairnConfig::default()
        };
        std::fs::create_dir_all(dir).map_err(|e| Error::Persistence {
            reason: format!("cannot create data directory {}: {}", dir.display(), e),
        })?;

        let bytes = snapshot.len();
        let path = FileSnapshotStore::new(dir).save(&SaveRequest {
            db_buffer: snapshot,
            db_name: config.db_name,
        })?;
        info!(target: "cairn::bridge", path = %path.display(), bytes, "Imported snapshot");
        Ok(path)
    }

    async fn start(
        client: cairn_engine::ClientEnd,
        ctx: ExecutionContext,
        data_dir: Option<PathBuf>,
        config: CairnConfig,
        snapshot: Option<Vec<u8>>,
    ) -> Result<Self> {
        let bridge = Bridge::connect(client, BridgeConfig::from(&config));
        let db = Self {
            bridge,
            status: ctx.status_handle(),
            context: Mutex::new(Some(ctx)),
            data_dir,
            config,
        };

        if let Err(e) = db.bridge.init(snapshot).await {
            if let Err(close_err) = db.shutdown().await {
                warn!(target: "cairn::bridge", error = %close_err, "Shutdown after failed init also failed");
            }
            return Err(e);
        }
        Ok(db)
    }

    /// The bridge, for callers that want to share it across tasks.
    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    /// Data directory; `None` for ephemeral databases.
    pub fn data_dir(&self) -> Option<&Path> {
        self.data_dir.as_deref()
    }

    /// Configuration in effect.
    pub fn config(&self) -> &CairnConfig {
        &self.config
    }

    /// Persistence health; `None` for ephemeral databases.
    pub fn persistence_status(&self) -> Option<PersistenceStatus> {
        self.status.as_ref().map(|s| s.read().clone())
    }

    /// Run a read-only statement.
    pub async fn query(&self, sql: impl Into<String>, params: Vec<Value>) -> Result<QueryResult> {
        self.bridge.query(sql, params).await
    }

    /// Run a mutating statement.
    pub async fn execute(
        &self,
        sql: impl Into<String>,
        params: Vec<Value>,
    ) -> Result<ExecuteResult> {
        self.bridge.execute(sql, params).await
    }

    /// Run several read-only statements in order.
    pub async fn batch_query(
        &self,
        statements: Vec<Statement>,
        use_transaction: bool,
    ) -> Result<Vec<EngineResult<QueryResult>>> {
        self.bridge.batch_query(statements, use_transaction).await
    }

    /// Serialize the whole store.
    pub async fn export(&self) -> Result<Vec<u8>> {
        self.bridge.export().await
    }

    /// Liveness check.
    pub async fn ping(&self) -> Result<PingInfo> {
        self.bridge.ping().await
    }

    /// Flush, stop the execution context and wait for it to exit.
    pub async fn close(self) -> Result<()> {
        self.shutdown().await
    }

    async fn shutdown(&self) -> Result<()> {
        let closed = self.bridge.close().await;
        let ctx = self.context.lock().take();
        if let Some(ctx) = ctx {
            tokio::task::spawn_blocking(move || ctx.join())
                .await
                .map_err(|e| Error::Internal {
                    reason: format!("join task failed: {}", e),
                })??;
        }
        closed
    }
}

impl std::fmt::Debug for Cairn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cairn")
            .field("data_dir", &self.data_dir)
            .field("bridge", &self.bridge)
            .finish()
    }
}
