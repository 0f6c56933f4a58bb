//! Read-after-write within one caller, with and without batching.

use std::time::Duration;

use crate::common::*;

#[tokio::test]
async fn insert_then_select_sees_row() {
    let (bridge, _ctx) = ephemeral_bridge(BridgeConfig::default()).await;
    bridge
        .execute("CREATE TABLE t (x INTEGER)", vec![])
        .await
        .unwrap();

    bridge
        .execute("INSERT INTO t(x) VALUES (1)", vec![])
        .await
        .unwrap();
    let rows = bridge.query("SELECT x FROM t", vec![]).await.unwrap();

    assert_eq!(rows.rows, vec![vec![Value::Int(1)]]);
}

#[tokio::test]
async fn execute_then_query_without_awaiting_write_is_ordered() {
    // Long window: the query sits in the batch queue while the execute is
    // already on its way.
    let (bridge, _ctx) = ephemeral_bridge(with_window(Duration::from_millis(100))).await;
    bridge
        .execute("CREATE TABLE t (x INTEGER)", vec![])
        .await
        .unwrap();

    for i in 0..20 {
        let write = bridge.execute("INSERT INTO t(x) VALUES (?1)", vec![Value::Int(i)]);
        let read = bridge.query("SELECT COUNT(*) AS n FROM t", vec![]);
        let (write, read) = tokio::join!(write, read);
        write.unwrap();
        let n = read.unwrap();
        assert_eq!(n.get(0, "n"), Some(&Value::Int(i + 1)));
    }
}

#[tokio::test]
async fn queued_reads_flush_before_a_write() {
    let (bridge, _ctx) = ephemeral_bridge(with_window(Duration::from_millis(200))).await;
    bridge
        .execute("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (1)", vec![])
        .await
        .unwrap();

    // Both reads are queued before the delete; they must observe one row.
    let before_a = bridge.query("SELECT COUNT(*) AS n FROM t", vec![]);
    let before_b = bridge.query("SELECT x FROM t", vec![]);
    let delete = bridge.execute("DELETE FROM t", vec![]);
    let (a, b, d) = tokio::join!(before_a, before_b, delete);

    assert_eq!(a.unwrap().get(0, "n"), Some(&Value::Int(1)));
    assert_eq!(b.unwrap().rows, vec![vec![Value::Int(1)]]);
    assert_eq!(d.unwrap().changes, 1);
}

#[tokio::test]
async fn concurrent_callers_all_complete() {
    let (bridge, _ctx) = ephemeral_bridge(BridgeConfig::default()).await;
    bridge
        .execute("CREATE TABLE t (x INTEGER)", vec![])
        .await
        .unwrap();

    let tasks: Vec<_> = (0..16)
        .map(|i| {
            let b = bridge.clone();
            tokio::spawn(async move {
                b.execute("INSERT INTO t(x) VALUES (?1)", vec![Value::Int(i)])
                    .await
                    .unwrap();
                b.query("SELECT x FROM t WHERE x = ?1", vec![Value::Int(i)])
                    .await
                    .unwrap()
            })
        })
        .collect();

    for (i, task) in tasks.into_iter().enumerate() {
        let rows = task.await.unwrap();
        assert_eq!(rows.rows, vec![vec![Value::Int(i as i64)]]);
    }
    assert_eq!(bridge.pending_requests(), 0);
}

#[tokio::test]
async fn batch_query_results_are_positional() {
    let (bridge, _ctx) = ephemeral_bridge(BridgeConfig::default()).await;
    bridge.execute(FIXTURE, vec![]).await.unwrap();

    let results = bridge
        .batch_query(
            vec![
                Statement::new("SELECT COUNT(*) FROM users"),
                Statement::new("SELECT nope FROM users"),
                Statement::with_params("SELECT name FROM users WHERE id = ?1", vec![Value::Int(2)]),
            ],
            true,
        )
        .await
        .unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().rows, vec![vec![Value::Int(3)]]);
    assert_eq!(results[1].as_ref().unwrap_err().kind, ErrorKind::Sql);
    assert_eq!(
        results[2].as_ref().unwrap().rows,
        vec![vec![Value::from("grace")]]
    );
}

#[tokio::test]
async fn constraint_violation_is_typed() {
    let (bridge, _ctx) = ephemeral_bridge(BridgeConfig::default()).await;
    bridge.execute(FIXTURE, vec![]).await.unwrap();

    let err = bridge
        .execute("INSERT INTO users (name) VALUES ('ada')", vec![])
        .await
        .unwrap_err();
    assert_eq!(err.engine_kind(), Some(ErrorKind::Constraint));

    // The connection is still usable afterwards.
    let rows = bridge.query("SELECT COUNT(*) FROM users", vec![]).await.unwrap();
    assert_eq!(rows.rows, vec![vec![Value::Int(3)]]);
}
