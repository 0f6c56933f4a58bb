//! The relational store owned by the execution context.
//!
//! A [`Store`] wraps one in-memory SQLite connection. It is created empty or
//! from a snapshot image, and it can produce a snapshot image of itself at
//! any point. Every rusqlite failure is translated into an [`EngineError`]
//! so it can be reported in a response without touching the transport.

use std::io::Write;
use std::time::Instant;

use cairn_core::{
    BatchItemResult, BatchOperation, EngineError, EngineResult, ErrorKind, ExecuteResult,
    QueryResult, Value,
};
use rusqlite::backup::Progress;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params_from_iter, Batch, Connection, DatabaseName, ErrorCode, Statement};
use tracing::{debug, warn};

/// In-memory relational store.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open a new, empty store.
    pub fn open_empty() -> EngineResult<Self> {
        let conn = Connection::open_in_memory().map_err(map_error)?;
        Ok(Self { conn })
    }

    /// Load a store from a snapshot image.
    ///
    /// An empty image yields an empty store. Anything that is not a valid
    /// database image fails with [`ErrorKind::Snapshot`].
    pub fn from_snapshot(bytes: &[u8]) -> EngineResult<Self> {
        if bytes.is_empty() {
            return Self::open_empty();
        }

        let started = Instant::now();
        let mut store = Self::open_empty()?;
        let mut scratch = tempfile::NamedTempFile::new().map_err(snapshot_io)?;
        scratch.write_all(bytes).map_err(snapshot_io)?;
        scratch.flush().map_err(snapshot_io)?;

        store
            .conn
            .restore(DatabaseName::Main, scratch.path(), None::<fn(Progress)>)
            .map_err(as_snapshot_error)?;

        // restore() can accept a truncated image; reading the schema forces
        // every page header to be checked.
        store
            .conn
            .query_row("PRAGMA schema_version", [], |row| row.get::<_, i64>(0))
            .map_err(as_snapshot_error)?;
        let report: String = store
            .conn
            .query_row("PRAGMA quick_check", [], |row| row.get(0))
            .map_err(as_snapshot_error)?;
        if report != "ok" {
            return Err(EngineError::new(
                ErrorKind::Snapshot,
                format!("snapshot failed integrity check: {}", report),
            ));
        }

        debug!(
            target: "cairn::engine",
            bytes = bytes.len(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "Store loaded from snapshot"
        );
        Ok(store)
    }

    /// Run a read-only statement.
    ///
    /// Transaction control and `ATTACH`/`DETACH` are rejected even though
    /// SQLite reports them as read-only: they change connection state that
    /// the persistence controller never hears about.
    pub fn query(&self, sql: &str, params: &[Value]) -> EngineResult<QueryResult> {
        check_sql(sql)?;
        if let Some(keyword) = leading_keyword(sql).filter(|k| is_connection_control(k)) {
            return Err(EngineError::invalid_input(format!(
                "query does not accept {}; use execute",
                keyword
            )));
        }
        let mut stmt = self.prepare_single(sql)?;
        if !stmt.readonly() {
            return Err(EngineError::invalid_input(
                "query only accepts read-only statements; use execute for writes",
            ));
        }
        let autocommit = self.conn.is_autocommit();

        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let width = columns.len();
        let mut rows = stmt
            .query(params_from_iter(params.iter().map(to_sql)))
            .map_err(map_error)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(map_error)? {
            let mut cells = Vec::with_capacity(width);
            for idx in 0..width {
                cells.push(from_sql(row.get_ref(idx).map_err(map_error)?));
            }
            out.push(cells);
        }
        drop(rows);

        if self.conn.is_autocommit() != autocommit {
            return Err(EngineError::invalid_input(
                "query changed the transaction state; use execute",
            ));
        }
        Ok(QueryResult { columns, rows: out })
    }

    /// Run a mutating statement.
    ///
    /// Without parameters the text may hold several `;`-separated
    /// statements (schema scripts); with parameters it must be exactly one.
    pub fn execute(&self, sql: &str, params: &[Value]) -> EngineResult<ExecuteResult> {
        check_sql(sql)?;
        if params.is_empty() {
            self.conn.execute_batch(sql).map_err(map_error)?;
        } else {
            self.prepare_single(sql)?
                .execute(params_from_iter(params.iter().map(to_sql)))
                .map_err(map_error)?;
        }

        Ok(ExecuteResult {
            changes: self.conn.changes() as u64,
            last_insert_id: self.conn.last_insert_rowid(),
        })
    }

    /// Run several read-only statements in order.
    ///
    /// Each operation gets its own result; a failing operation does not stop
    /// the ones after it. With `use_transaction` the operations share one
    /// read transaction and therefore observe the same state.
    pub fn batch_query(
        &self,
        operations: &[BatchOperation],
        use_transaction: bool,
    ) -> EngineResult<Vec<BatchItemResult>> {
        let tx = if use_transaction && self.conn.is_autocommit() {
            Some(self.conn.unchecked_transaction().map_err(map_error)?)
        } else {
            None
        };

        let results = operations
            .iter()
            .map(|op| BatchItemResult {
                correlation_id: op.correlation_id,
                outcome: self.query(&op.sql, &op.params),
            })
            .collect();

        if let Some(tx) = tx {
            tx.commit().map_err(map_error)?;
        }
        Ok(results)
    }

    /// Whether a transaction opened with `BEGIN` is still open.
    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    /// Roll back an open transaction, if any. Returns whether one was open.
    pub fn rollback_open_transaction(&self) -> EngineResult<bool> {
        if self.conn.is_autocommit() {
            return Ok(false);
        }
        self.conn.execute_batch("ROLLBACK").map_err(map_error)?;
        Ok(true)
    }

    /// Produce a snapshot image of the whole store.
    ///
    /// Fails with [`ErrorKind::Busy`] while a transaction is open, since
    /// the backup cannot read a locked database.
    pub fn export(&self) -> EngineResult<Vec<u8>> {
        if self.in_transaction() {
            return Err(EngineError::new(
                ErrorKind::Busy,
                "cannot export while a transaction is open",
            ));
        }
        let scratch = tempfile::NamedTempFile::new().map_err(snapshot_io)?;
        self.conn
            .backup(DatabaseName::Main, scratch.path(), None)
            .map_err(as_snapshot_error)?;
        std::fs::read(scratch.path()).map_err(snapshot_io)
    }

    /// Approximate bytes held by the store.
    pub fn memory_usage(&self) -> u64 {
        let pragma = |name: &str| -> rusqlite::Result<i64> {
            self.conn
                .query_row(&format!("PRAGMA {}", name), [], |row| row.get(0))
        };
        match (pragma("page_count"), pragma("page_size")) {
            (Ok(count), Ok(size)) => (count.max(0) as u64) * (size.max(0) as u64),
            (Err(e), _) | (_, Err(e)) => {
                warn!(target: "cairn::engine", error = %e, "Failed to read store size");
                0
            }
        }
    }
}

impl Store {
    /// Prepare exactly one statement; trailing statements are an error
    /// rather than silently dropped.
    fn prepare_single(&self, sql: &str) -> EngineResult<Statement<'_>> {
        let mut batch = Batch::new(&self.conn, sql);
        let stmt = batch
            .next()
            .map_err(map_error)?
            .ok_or_else(|| EngineError::invalid_input("sql holds no statement"))?;
        match batch.next() {
            Ok(None) => Ok(stmt),
            _ => Err(EngineError::invalid_input(
                "expected a single statement; use execute without parameters for scripts",
            )),
        }
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("autocommit", &self.conn.is_autocommit())
            .finish()
    }
}

fn check_sql(sql: &str) -> EngineResult<()> {
    if sql.trim().is_empty() {
        return Err(EngineError::invalid_input("sql must not be empty"));
    }
    Ok(())
}

/// First keyword of `sql`, upper-cased, skipping whitespace and comments.
fn leading_keyword(sql: &str) -> Option<String> {
    let mut rest = sql;
    loop {
        rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix("--") {
            rest = after.split_once('\n').map_or("", |(_, tail)| tail);
        } else if let Some(after) = rest.strip_prefix("/*") {
            rest = after.split_once("*/").map_or("", |(_, tail)| tail);
        } else {
            break;
        }
    }
    let word: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphabetic())
        .collect();
    (!word.is_empty()).then(|| word.to_ascii_uppercase())
}

fn is_connection_control(keyword: &str) -> bool {
    matches!(
        keyword,
        "BEGIN" | "COMMIT" | "END" | "ROLLBACK" | "SAVEPOINT" | "RELEASE" | "ATTACH" | "DETACH"
    )
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Int(i) => SqlValue::Integer(*i),
        Value::Float(f) => SqlValue::Real(*f),
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Bytes(b) => SqlValue::Blob(b.clone()),
    }
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(t) => Value::String(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Bytes(b.to_vec()),
    }
}

fn snapshot_io(err: std::io::Error) -> EngineError {
    EngineError::new(ErrorKind::Snapshot, format!("snapshot scratch file: {}", err))
}

fn as_snapshot_error(err: rusqlite::Error) -> EngineError {
    EngineError::new(ErrorKind::Snapshot, err.to_string())
}

/// Classify a rusqlite error.
pub(crate) fn map_error(err: rusqlite::Error) -> EngineError {
    let kind = match &err {
        rusqlite::Error::SqliteFailure(failure, _) => match failure.code {
            ErrorCode::ConstraintViolation => ErrorKind::Constraint,
            ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked => ErrorKind::Busy,
            ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt => ErrorKind::Snapshot,
            ErrorCode::ApiMisuse | ErrorCode::InternalMalfunction => ErrorKind::Internal,
            _ => ErrorKind::Sql,
        },
        rusqlite::Error::InvalidParameterCount(..)
        | rusqlite::Error::InvalidParameterName(_)
        | rusqlite::Error::ExecuteReturnedResults => ErrorKind::InvalidInput,
        _ => ErrorKind::Sql,
    };
    EngineError::new(kind, err.to_string())
}
