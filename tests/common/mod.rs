//! Shared test utilities for the integration suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

use std::sync::Arc;
use std::time::Duration;

pub use cairn::{
    duplex, Bridge, BridgeConfig, Cairn, CairnConfig, ChannelEvent, ClientEnd, ContextEnd, Error,
    ErrorKind, ExecutionContext, PersistenceConfig, QueueConfig, RetryPolicy, Statement, Value,
};
pub use cairn_durability::testing::RecordingSink;
pub use cairn_durability::{FileSnapshotStore, SnapshotSink};
use tempfile::TempDir;

// ============================================================================
// Fixtures
// ============================================================================

/// Statements that build a small mixed-type dataset.
pub const FIXTURE: &str = "
    CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE, score REAL, avatar BLOB);
    CREATE TABLE posts (id INTEGER PRIMARY KEY, user_id INTEGER REFERENCES users(id), body TEXT);
    CREATE INDEX posts_by_user ON posts(user_id);
    INSERT INTO users (name, score, avatar) VALUES
        ('ada', 9.5, x'00ff'),
        ('grace', 8.25, NULL),
        ('linus', NULL, x'');
    INSERT INTO posts (user_id, body) VALUES
        (1, 'first'), (1, 'second'), (2, 'hello'), (3, NULL);
";

/// Queries whose results describe the whole fixture.
pub const FIXTURE_QUERIES: &[&str] = &[
    "SELECT id, name, score, avatar FROM users ORDER BY id",
    "SELECT id, user_id, body FROM posts ORDER BY id",
    "SELECT u.name, COUNT(p.id) AS n FROM users u LEFT JOIN posts p ON p.user_id = u.id GROUP BY u.id ORDER BY u.id",
    "SELECT name FROM sqlite_master WHERE type IN ('table', 'index') ORDER BY name",
];

// ============================================================================
// Bridge helpers
// ============================================================================

/// A bridge over a fresh in-memory context, already initialized.
pub async fn ephemeral_bridge(config: BridgeConfig) -> (Bridge, ExecutionContext) {
    let (client, context) = duplex();
    let ctx = ExecutionContext::ephemeral(context).unwrap();
    let bridge = Bridge::connect(client, config);
    bridge.init(None).await.unwrap();
    (bridge, ctx)
}

/// A bridge over a context that persists through `sink`. Not initialized.
pub fn persistent_bridge(
    sink: Arc<RecordingSink>,
    persistence: PersistenceConfig,
) -> (Bridge, ExecutionContext) {
    let (client, context) = duplex();
    let ctx = ExecutionContext::persistent(context, sink, persistence).unwrap();
    let bridge = Bridge::connect(client, BridgeConfig::default());
    (bridge, ctx)
}

/// Bridge config with a given batch window.
pub fn with_window(window: Duration) -> BridgeConfig {
    BridgeConfig {
        queue: QueueConfig {
            window,
            ..QueueConfig::default()
        },
        ..BridgeConfig::default()
    }
}

/// Run every fixture query and collect the rows.
pub async fn dump(bridge: &Bridge) -> Vec<Vec<Vec<Value>>> {
    let mut out = Vec::new();
    for sql in FIXTURE_QUERIES {
        out.push(bridge.query(*sql, vec![]).await.unwrap().rows);
    }
    out
}

// ============================================================================
// Data directories
// ============================================================================

/// A temp data directory with a `cairn.toml` using a short debounce.
pub fn data_dir(debounce_ms: u64) -> TempDir {
    let dir = TempDir::new().unwrap();
    let config = CairnConfig {
        debounce_ms,
        ..CairnConfig::default()
    };
    config
        .write_to_file(&dir.path().join(cairn_engine::CONFIG_FILE_NAME))
        .unwrap();
    dir
}
