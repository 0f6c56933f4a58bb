//! Session wrapper driving the async database handle from the shell.
//!
//! The REPL and pipe loops are synchronous; every call blocks on the
//! session's runtime.

use cairn_executor::{
    Cairn, ExecuteResult, PersistenceStatus, PingInfo, QueryResult, Result, Value,
};
use tokio::runtime::Runtime;

/// Owns the runtime and the open database.
pub struct SessionState {
    runtime: Runtime,
    db: Cairn,
}

impl SessionState {
    pub fn new(runtime: Runtime, db: Cairn) -> Self {
        Self { runtime, db }
    }

    pub fn query(&self, sql: &str, params: Vec<Value>) -> Result<QueryResult> {
        self.runtime.block_on(self.db.query(sql, params))
    }

    pub fn execute(&self, sql: &str, params: Vec<Value>) -> Result<ExecuteResult> {
        self.runtime.block_on(self.db.execute(sql, params))
    }

    pub fn export(&self) -> Result<Vec<u8>> {
        self.runtime.block_on(self.db.export())
    }

    pub fn ping(&self) -> Result<PingInfo> {
        self.runtime.block_on(self.db.ping())
    }

    /// `None` for in-memory sessions.
    pub fn persistence_status(&self) -> Option<PersistenceStatus> {
        self.db.persistence_status()
    }

    /// Prompt string for the REPL.
    pub fn prompt(&self) -> String {
        match self.db.data_dir() {
            Some(dir) => format!(
                "cairn:{}> ",
                dir.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| dir.display().to_string())
            ),
            None => "cairn:memory> ".to_string(),
        }
    }

    /// Final flush and shutdown.
    pub fn close(self) -> Result<()> {
        let Self { runtime, db } = self;
        runtime.block_on(db.close())
    }
}
