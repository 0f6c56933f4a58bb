//! Export / init round trips between independent contexts.

use crate::common::*;

#[tokio::test]
async fn export_then_init_reproduces_dataset() {
    let (source, _src_ctx) = ephemeral_bridge(BridgeConfig::default()).await;
    source.execute(FIXTURE, vec![]).await.unwrap();
    source
        .execute("UPDATE users SET score = score * 2 WHERE score IS NOT NULL", vec![])
        .await
        .unwrap();
    let expected = dump(&source).await;
    let image = source.export().await.unwrap();

    let (client, context) = duplex();
    let _ctx = ExecutionContext::ephemeral(context).unwrap();
    let copy = Bridge::connect(client, BridgeConfig::default());
    copy.init(Some(image)).await.unwrap();

    assert_eq!(dump(&copy).await, expected);
}

#[tokio::test]
async fn restored_copy_is_independent() {
    let (source, _src_ctx) = ephemeral_bridge(BridgeConfig::default()).await;
    source.execute(FIXTURE, vec![]).await.unwrap();
    let image = source.export().await.unwrap();

    let (client, context) = duplex();
    let _ctx = ExecutionContext::ephemeral(context).unwrap();
    let copy = Bridge::connect(client, BridgeConfig::default());
    copy.init(Some(image)).await.unwrap();

    copy.execute("DELETE FROM posts", vec![]).await.unwrap();

    let left = source.query("SELECT COUNT(*) FROM posts", vec![]).await.unwrap();
    let right = copy.query("SELECT COUNT(*) FROM posts", vec![]).await.unwrap();
    assert_eq!(left.rows, vec![vec![Value::Int(4)]]);
    assert_eq!(right.rows, vec![vec![Value::Int(0)]]);
}

#[tokio::test]
async fn init_with_garbage_is_a_snapshot_error() {
    let (client, context) = duplex();
    let _ctx = ExecutionContext::ephemeral(context).unwrap();
    let bridge = Bridge::connect(client, BridgeConfig::default());

    let err = bridge
        .init(Some(b"this is not a database image".to_vec()))
        .await
        .unwrap_err();
    assert_eq!(err.engine_kind(), Some(ErrorKind::Snapshot));

    // Still uninitialized: a later valid init succeeds.
    bridge.init(None).await.unwrap();
    bridge.ping().await.unwrap();
}

#[tokio::test]
async fn empty_export_restores_to_empty_store() {
    let (source, _src_ctx) = ephemeral_bridge(BridgeConfig::default()).await;
    let image = source.export().await.unwrap();

    let (client, context) = duplex();
    let _ctx = ExecutionContext::ephemeral(context).unwrap();
    let copy = Bridge::connect(client, BridgeConfig::default());
    copy.init(Some(image)).await.unwrap();

    let tables = copy
        .query("SELECT COUNT(*) FROM sqlite_master", vec![])
        .await
        .unwrap();
    assert_eq!(tables.rows, vec![vec![Value::Int(0)]]);
}
