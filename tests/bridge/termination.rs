//! What callers see when the execution context goes away.

use std::thread;
use std::time::Duration;

use crate::common::*;

fn no_timeout() -> BridgeConfig {
    BridgeConfig {
        request_timeout: None,
        ..BridgeConfig::default()
    }
}

/// Swallow commands for a while, then report termination.
fn silent_context(context: ContextEnd, reason: &'static str) -> thread::JoinHandle<usize> {
    thread::spawn(move || {
        let mut seen = 0;
        while context
            .commands
            .recv_timeout(Duration::from_millis(300))
            .is_ok()
        {
            seen += 1;
        }
        context.events.terminate(reason);
        seen
    })
}

#[tokio::test]
async fn termination_rejects_every_pending_request() {
    let (client, context) = duplex();
    let bridge = Bridge::connect(client, no_timeout());
    let worker = silent_context(context, "worker crashed");

    let calls: Vec<_> = [
        "INSERT INTO t VALUES (1)",
        "INSERT INTO t VALUES (2)",
        "INSERT INTO t VALUES (3)",
    ]
    .into_iter()
    .map(|sql| {
        let b = bridge.clone();
        tokio::spawn(async move { b.execute(sql, vec![]).await })
    })
    .collect();

    for call in calls {
        let outcome = tokio::time::timeout(Duration::from_secs(5), call)
            .await
            .expect("caller hung after termination")
            .unwrap();
        let err = outcome.unwrap_err();
        assert!(err.is_channel(), "expected channel error, got {:?}", err);
        assert!(err.to_string().contains("worker crashed"));
    }

    assert_eq!(worker.join().unwrap(), 3);
    assert_eq!(bridge.pending_requests(), 0);
    assert_eq!(bridge.terminated().as_deref(), Some("worker crashed"));
}

#[tokio::test]
async fn requests_after_termination_fail_fast() {
    let (client, context) = duplex();
    let bridge = Bridge::connect(client, no_timeout());
    context.events.terminate("gone");
    drop(context);

    // Let the pump observe the event.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let err = tokio::time::timeout(Duration::from_secs(5), bridge.ping())
        .await
        .expect("request after termination hung")
        .unwrap_err();
    assert!(err.is_channel());
}

#[tokio::test]
async fn dropped_context_end_rejects_pending() {
    let (client, context) = duplex();
    let bridge = Bridge::connect(client, no_timeout());

    let pending = {
        let b = bridge.clone();
        tokio::spawn(async move { b.ping().await })
    };
    // Give the request time to register, then vanish without a word.
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(context);

    let err = tokio::time::timeout(Duration::from_secs(5), pending)
        .await
        .expect("caller hung after channel closed")
        .unwrap()
        .unwrap_err();
    assert!(err.is_channel());
}

#[tokio::test]
async fn close_then_requests_fail_with_channel_error() {
    let (bridge, ctx) = ephemeral_bridge(BridgeConfig::default()).await;
    bridge.close().await.unwrap();
    ctx.join().unwrap();

    let err = bridge.query("SELECT 1", vec![]).await.unwrap_err();
    assert!(err.is_channel());
}
