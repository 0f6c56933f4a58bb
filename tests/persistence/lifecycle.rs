//! Final flush on close and on implicit shutdown.

use std::sync::Arc;
use std::time::Duration;

use crate::common::*;

#[tokio::test]
async fn close_flushes_without_waiting_for_debounce() {
    let sink = Arc::new(RecordingSink::new());
    let config = PersistenceConfig::default().with_debounce(Duration::from_secs(60));
    let (bridge, ctx) = persistent_bridge(sink.clone(), config);
    bridge.init(None).await.unwrap();
    bridge
        .execute("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (7)", vec![])
        .await
        .unwrap();
    assert_eq!(sink.attempt_count(), 0);

    bridge.close().await.unwrap();
    ctx.join().unwrap();

    assert_eq!(sink.save_count(), 1);
}

#[tokio::test]
async fn close_on_clean_store_does_not_flush() {
    let sink = Arc::new(RecordingSink::new());
    let (bridge, ctx) = persistent_bridge(sink.clone(), PersistenceConfig::default());
    bridge.init(None).await.unwrap();
    bridge.query("SELECT 1", vec![]).await.unwrap();

    bridge.close().await.unwrap();
    ctx.join().unwrap();
    assert_eq!(sink.attempt_count(), 0);
}

#[tokio::test]
async fn close_waits_for_in_flight_flush_then_flushes_the_rest() {
    let sink = Arc::new(RecordingSink::new());
    let config = PersistenceConfig::default().with_debounce(Duration::from_millis(50));
    let (bridge, ctx) = persistent_bridge(sink.clone(), config);
    bridge.init(None).await.unwrap();
    sink.hold();
    bridge
        .execute("CREATE TABLE t (x INTEGER)", vec![])
        .await
        .unwrap();
    assert!(sink.wait_for_write_in_progress(Duration::from_secs(5)));
    bridge
        .execute("INSERT INTO t VALUES (1)", vec![])
        .await
        .unwrap();

    let releaser = {
        let sink = sink.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(200));
            sink.release();
        })
    };
    bridge.close().await.unwrap();
    ctx.join().unwrap();
    releaser.join().unwrap();

    assert_eq!(sink.save_count(), 2);
}

#[tokio::test]
async fn close_reports_final_flush_failure() {
    let sink = Arc::new(RecordingSink::new());
    let config = PersistenceConfig::default()
        .with_debounce(Duration::from_secs(60))
        .with_retry(RetryPolicy::NextMutation);
    let (bridge, ctx) = persistent_bridge(sink.clone(), config);
    bridge.init(None).await.unwrap();
    bridge
        .execute("CREATE TABLE t (x INTEGER)", vec![])
        .await
        .unwrap();

    sink.fail_next(usize::MAX);
    let err = bridge.close().await.unwrap_err();
    assert_eq!(err.engine_kind(), Some(ErrorKind::Persistence));
    ctx.join().unwrap();
}

#[tokio::test]
async fn dropping_every_handle_still_flushes() {
    let sink = Arc::new(RecordingSink::new());
    let config = PersistenceConfig::default().with_debounce(Duration::from_secs(60));
    let (bridge, ctx) = persistent_bridge(sink.clone(), config);
    bridge.init(None).await.unwrap();
    bridge
        .execute("CREATE TABLE t (x INTEGER)", vec![])
        .await
        .unwrap();

    drop(bridge);
    tokio::task::spawn_blocking(move || ctx.join())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(sink.save_count(), 1);
}

#[tokio::test]
async fn status_reflects_completed_flush() {
    let sink = Arc::new(RecordingSink::new());
    let config = PersistenceConfig::default()
        .with_debounce(Duration::from_millis(50))
        .with_db_name("status.db");
    let (bridge, ctx) = persistent_bridge(sink.clone(), config);
    bridge.init(None).await.unwrap();
    bridge
        .execute("CREATE TABLE t (x INTEGER)", vec![])
        .await
        .unwrap();
    assert!(sink.wait_for_saves(1, Duration::from_secs(5)));
    tokio::time::sleep(Duration::from_millis(50)).await;

    let status = ctx.persistence_status().unwrap();
    assert!(status.is_clean());
    assert_eq!(status.flushes_started, 1);
    assert_eq!(status.flushes_completed, 1);
    assert!(status.last_flush_at.is_some());
    assert_eq!(status.last_snapshot_bytes, Some(sink.latest().unwrap().len()));
    assert_eq!(sink.saves()[0].db_name, "status.db");
}
