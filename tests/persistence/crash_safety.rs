//! On-disk snapshots: reopen, interrupted writes, and corrupt files.

use std::fs;
use std::time::{Duration, Instant};

use crate::common::*;

async fn wait_until_clean(db: &Cairn, timeout: Duration) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if db.persistence_status().map_or(false, |s| s.is_clean()) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn debounced_flush_reaches_disk_before_close() {
    let dir = data_dir(50);
    let db = Cairn::open(dir.path()).await.unwrap();
    db.execute(FIXTURE, vec![]).await.unwrap();
    let expected = dump(db.bridge()).await;

    assert!(wait_until_clean(&db, Duration::from_secs(5)).await);
    let on_disk = fs::read(dir.path().join("cairn.db")).unwrap();
    assert!(!on_disk.is_empty());

    // A second process reading the file sees the flushed state.
    let (client, context) = duplex();
    let _ctx = ExecutionContext::ephemeral(context).unwrap();
    let reader = Bridge::connect(client, BridgeConfig::default());
    reader.init(Some(on_disk)).await.unwrap();
    assert_eq!(dump(&reader).await, expected);

    db.close().await.unwrap();
}

#[tokio::test]
async fn reopen_after_close_restores_everything() {
    let dir = data_dir(60_000);
    let db = Cairn::open(dir.path()).await.unwrap();
    db.execute(FIXTURE, vec![]).await.unwrap();
    let expected = dump(db.bridge()).await;
    db.close().await.unwrap();

    let db = Cairn::open(dir.path()).await.unwrap();
    assert_eq!(dump(db.bridge()).await, expected);
    db.close().await.unwrap();
}

#[tokio::test]
async fn interrupted_write_leaves_previous_snapshot_intact() {
    let dir = data_dir(60_000);
    let db = Cairn::open(dir.path()).await.unwrap();
    db.execute(FIXTURE, vec![]).await.unwrap();
    let expected = dump(db.bridge()).await;
    db.close().await.unwrap();

    // A crash mid-flush leaves a partial temp file beside the snapshot.
    let partial = cairn_durability::temp_path(dir.path(), "cairn.db");
    fs::write(&partial, b"SQLite format 3\0truncated").unwrap();

    let db = Cairn::open(dir.path()).await.unwrap();
    assert!(!partial.exists());
    assert_eq!(dump(db.bridge()).await, expected);
    db.close().await.unwrap();
}

#[tokio::test]
async fn snapshot_file_is_replaced_not_appended() {
    let dir = data_dir(60_000);
    let db = Cairn::open(dir.path()).await.unwrap();
    db.execute(FIXTURE, vec![]).await.unwrap();
    db.close().await.unwrap();
    let first = fs::read(dir.path().join("cairn.db")).unwrap();

    let db = Cairn::open(dir.path()).await.unwrap();
    db.execute("DROP TABLE posts; VACUUM", vec![]).await.unwrap();
    db.close().await.unwrap();
    let second = fs::read(dir.path().join("cairn.db")).unwrap();

    assert!(second.len() < first.len());
    let leftovers: Vec<_> = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name != "cairn.db" && name != "cairn.toml")
        .collect();
    assert!(leftovers.is_empty(), "unexpected files: {:?}", leftovers);
}

#[tokio::test]
async fn corrupt_snapshot_refuses_to_open() {
    let dir = data_dir(60_000);
    fs::write(dir.path().join("cairn.db"), vec![0xAB; 4096]).unwrap();

    let err = Cairn::open(dir.path()).await.unwrap_err();
    assert_eq!(err.engine_kind(), Some(ErrorKind::Snapshot));
    // The bad file is left for inspection.
    assert!(dir.path().join("cairn.db").exists());
}

#[tokio::test]
async fn custom_db_name_from_config() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = CairnConfig {
        db_name: "notes.sqlite".into(),
        ..CairnConfig::default()
    };
    let db = Cairn::open_with_config(dir.path(), config.clone())
        .await
        .unwrap();
    db.execute("CREATE TABLE n (body TEXT)", vec![]).await.unwrap();
    db.close().await.unwrap();

    assert!(dir.path().join("notes.sqlite").exists());
    assert!(!dir.path().join("cairn.db").exists());

    let db = Cairn::open_with_config(dir.path(), config).await.unwrap();
    let rows = db
        .query("SELECT name FROM sqlite_master WHERE type = 'table'", vec![])
        .await
        .unwrap();
    assert_eq!(rows.rows, vec![vec![Value::from("n")]]);
    db.close().await.unwrap();
}

#[tokio::test]
async fn close_inside_transaction_keeps_committed_data() {
    let dir = data_dir(60_000);
    let db = Cairn::open(dir.path()).await.unwrap();
    db.execute("CREATE TABLE t (x INTEGER)", vec![]).await.unwrap();
    db.execute("INSERT INTO t VALUES (1)", vec![]).await.unwrap();

    // Transaction control is a write-path command.
    let err = db.query("BEGIN", vec![]).await.unwrap_err();
    assert_eq!(err.engine_kind(), Some(ErrorKind::InvalidInput));

    db.execute("BEGIN", vec![]).await.unwrap();
    db.execute("INSERT INTO t VALUES (2)", vec![]).await.unwrap();
    db.close().await.unwrap();

    let db = Cairn::open(dir.path()).await.unwrap();
    let rows = db.query("SELECT x FROM t", vec![]).await.unwrap();
    assert_eq!(rows.rows, vec![vec![Value::Int(1)]]);
    db.close().await.unwrap();
}
