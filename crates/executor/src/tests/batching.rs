//! Batching tests: concurrent reads cross the channel as one batch and each
//! caller gets its own result back.

use std::time::Duration;

use crate::{duplex, Bridge, BridgeConfig, ErrorKind, ExecutionContext, QueueConfig, Value};

async fn seeded_bridge(queue: QueueConfig) -> (Bridge, ExecutionContext) {
    let (client, context) = duplex();
    let ctx = ExecutionContext::ephemeral(context).unwrap();
    let bridge = Bridge::connect(
        client,
        BridgeConfig {
            queue,
            ..BridgeConfig::default()
        },
    );
    bridge.init(None).await.unwrap();
    bridge
        .execute(
            "CREATE TABLE items (id INTEGER PRIMARY KEY, label TEXT);
             INSERT INTO items (label) VALUES ('a'), ('b'), ('c');",
            vec![],
        )
        .await
        .unwrap();
    (bridge, ctx)
}

#[tokio::test]
async fn test_concurrent_queries_each_get_their_rows() {
    let (bridge, _ctx) = seeded_bridge(QueueConfig::default()).await;

    let calls: Vec<_> = (1..=3)
        .map(|id| {
            let b = bridge.clone();
            tokio::spawn(async move {
                b.query("SELECT label FROM items WHERE id = ?1", vec![Value::Int(id)])
                    .await
            })
        })
        .collect();

    let mut labels = Vec::new();
    for call in calls {
        let rows = call.await.unwrap().unwrap();
        labels.push(rows.rows[0][0].clone());
    }
    assert_eq!(
        labels,
        vec![Value::from("a"), Value::from("b"), Value::from("c")]
    );
}

#[tokio::test]
async fn test_bad_query_in_batch_fails_only_its_caller() {
    let (bridge, _ctx) = seeded_bridge(QueueConfig {
        window: Duration::from_millis(200),
        ..QueueConfig::default()
    })
    .await;

    let good = {
        let b = bridge.clone();
        tokio::spawn(async move { b.query("SELECT COUNT(*) AS n FROM items", vec![]).await })
    };
    let bad = {
        let b = bridge.clone();
        tokio::spawn(async move { b.query("SELECT * FROM nope", vec![]).await })
    };

    let good = good.await.unwrap().unwrap();
    assert_eq!(good.get(0, "n"), Some(&Value::Int(3)));
    let bad = bad.await.unwrap().unwrap_err();
    assert_eq!(bad.engine_kind(), Some(ErrorKind::Sql));
}

#[tokio::test]
async fn test_execute_then_batched_query_sees_effect() {
    let (bridge, _ctx) = seeded_bridge(QueueConfig::default()).await;

    bridge
        .execute("INSERT INTO items (label) VALUES ('d')", vec![])
        .await
        .unwrap();

    let (count, labels) = tokio::join!(
        bridge.query("SELECT COUNT(*) AS n FROM items", vec![]),
        bridge.query("SELECT label FROM items ORDER BY id DESC LIMIT 1", vec![]),
    );
    assert_eq!(count.unwrap().get(0, "n"), Some(&Value::Int(4)));
    assert_eq!(labels.unwrap().get(0, "label"), Some(&Value::from("d")));
}

#[tokio::test]
async fn test_write_queues_behind_earlier_reads() {
    let (bridge, _ctx) = seeded_bridge(QueueConfig {
        window: Duration::from_secs(3600),
        ..QueueConfig::default()
    })
    .await;

    // The read sits in the queue; the write must not overtake it.
    let read = {
        let b = bridge.clone();
        tokio::spawn(async move { b.query("SELECT COUNT(*) AS n FROM items", vec![]).await })
    };
    while bridge.pending_requests() == 0 {
        tokio::task::yield_now().await;
    }
    bridge
        .execute("DELETE FROM items", vec![])
        .await
        .unwrap();

    let rows = read.await.unwrap().unwrap();
    assert_eq!(rows.get(0, "n"), Some(&Value::Int(3)));
}
