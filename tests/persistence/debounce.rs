//! Debounce and single-flight behavior.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::common::*;

#[tokio::test]
async fn burst_of_mutations_produces_one_flush_after_quiet_period() {
    let sink = Arc::new(RecordingSink::new());
    let config = PersistenceConfig::default().with_debounce(Duration::from_millis(2000));
    let (bridge, _ctx) = persistent_bridge(sink.clone(), config);
    bridge.init(None).await.unwrap();
    bridge
        .execute("CREATE TABLE t (x INTEGER)", vec![])
        .await
        .unwrap();

    let mut last = Instant::now();
    for i in 0..4 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        bridge
            .execute("INSERT INTO t VALUES (?1)", vec![Value::Int(i)])
            .await
            .unwrap();
        last = Instant::now();
    }

    assert!(sink.wait_for_saves(1, Duration::from_secs(5)));
    // Nothing else is coming.
    tokio::time::sleep(Duration::from_millis(700)).await;
    let saves = sink.saves();
    assert_eq!(saves.len(), 1);

    let delay = saves[0].started_at.saturating_duration_since(last);
    assert!(
        delay >= Duration::from_millis(1900) && delay < Duration::from_millis(3000),
        "flush started {:?} after the last mutation",
        delay
    );
}

#[tokio::test]
async fn reads_never_mark_dirty() {
    let sink = Arc::new(RecordingSink::new());
    let config = PersistenceConfig::default().with_debounce(Duration::from_millis(100));
    let (bridge, ctx) = persistent_bridge(sink.clone(), config);
    bridge.init(None).await.unwrap();

    for _ in 0..5 {
        bridge.query("SELECT 1", vec![]).await.unwrap();
    }
    bridge.export().await.unwrap();
    bridge.ping().await.unwrap();

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(sink.attempt_count(), 0);
    assert!(ctx.persistence_status().unwrap().is_clean());
}

#[tokio::test]
async fn mutation_during_flush_schedules_exactly_one_follow_up() {
    let sink = Arc::new(RecordingSink::new());
    let config = PersistenceConfig::default().with_debounce(Duration::from_millis(100));
    let (bridge, ctx) = persistent_bridge(sink.clone(), config);
    bridge.init(None).await.unwrap();
    bridge
        .execute("CREATE TABLE t (x INTEGER)", vec![])
        .await
        .unwrap();

    sink.hold();
    assert!(sink.wait_for_write_in_progress(Duration::from_secs(5)));

    // Several mutations while the first flush is stuck in the sink; their
    // debounce deadlines expire during the flush.
    for i in 0..3 {
        bridge
            .execute("INSERT INTO t VALUES (?1)", vec![Value::Int(i)])
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(sink.attempt_count(), 1, "second flush started while one was in flight");
    let status = ctx.persistence_status().unwrap();
    assert!(status.flushing);
    assert!(status.dirty);

    sink.release();
    assert!(sink.wait_for_saves(2, Duration::from_secs(5)));
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(sink.save_count(), 2);

    // The follow-up carries every mutation.
    let (client, context) = duplex();
    let _reader_ctx = ExecutionContext::ephemeral(context).unwrap();
    let reader = Bridge::connect(client, BridgeConfig::default());
    reader.init(sink.latest()).await.unwrap();
    let rows = reader.query("SELECT COUNT(*) FROM t", vec![]).await.unwrap();
    assert_eq!(rows.rows, vec![vec![Value::Int(3)]]);

    assert!(ctx.persistence_status().unwrap().is_clean());
}

#[tokio::test]
async fn failed_flush_is_retried_with_backoff() {
    let sink = Arc::new(RecordingSink::new());
    let config = PersistenceConfig::default()
        .with_debounce(Duration::from_millis(50))
        .with_retry(RetryPolicy::Backoff {
            initial: Duration::from_millis(100),
            max: Duration::from_millis(400),
        });
    let (bridge, ctx) = persistent_bridge(sink.clone(), config);
    bridge.init(None).await.unwrap();

    sink.fail_next(2);
    bridge
        .execute("CREATE TABLE t (x INTEGER)", vec![])
        .await
        .unwrap();

    // No further mutations: the retry timer alone gets it to disk.
    assert!(sink.wait_for_saves(1, Duration::from_secs(5)));
    assert_eq!(sink.attempt_count(), 3);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let status = ctx.persistence_status().unwrap();
    assert_eq!(status.flushes_failed, 2);
    assert_eq!(status.flushes_completed, 1);
    assert_eq!(status.consecutive_failures, 0);
    assert!(status.is_clean());
}

#[tokio::test]
async fn failed_flush_waits_for_next_mutation_when_configured() {
    let sink = Arc::new(RecordingSink::new());
    let config = PersistenceConfig::default()
        .with_debounce(Duration::from_millis(50))
        .with_retry(RetryPolicy::NextMutation);
    let (bridge, ctx) = persistent_bridge(sink.clone(), config);
    bridge.init(None).await.unwrap();

    sink.fail_next(1);
    bridge
        .execute("CREATE TABLE t (x INTEGER)", vec![])
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(sink.attempt_count(), 1);
    let status = ctx.persistence_status().unwrap();
    assert!(status.dirty);
    assert!(status.last_error.is_some());

    bridge
        .execute("INSERT INTO t VALUES (1)", vec![])
        .await
        .unwrap();
    assert!(sink.wait_for_saves(1, Duration::from_secs(5)));
}
