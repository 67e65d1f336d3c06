//! Heartbeat tests on a paused clock

#[macro_use]
mod common;

use common::{scripted, scripted_builder, STEP_TIMEOUT};
use gateway_shard::{ConnectionPhase, ShardEvent};
use std::sync::Arc;
use tokio::time::timeout;

#[tokio::test(start_paused = true)]
async fn test_missed_ack_reconnects_once_and_resumes() {
    verbose_println!("Testing zombie connection detection...");

    let (connector, mut script) = scripted();
    let manager = Arc::new(scripted_builder(connector).build().unwrap());

    let connecting = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.connect().await })
    };

    let mut server = script.accept().await;
    server.hello(1_000);
    server.expect_op(2).await;
    server.ready(1, "session-1");
    connecting.await.unwrap().unwrap();

    // Never ack: the second tick finds the first beat unanswered
    assert_eq!(server.expect_close().await, Some(4000));

    let mut server = script.accept().await;
    server.hello(1_000);
    let resume = server.expect_op(6).await;
    assert_eq!(resume["d"]["session_id"], "session-1");
    assert_eq!(resume["d"]["seq"], 1);
    server.resumed(2);

    for _ in 0..3 {
        let heartbeat = server.expect_op(1).await;
        assert_eq!(heartbeat["d"], 2);
        server.heartbeat_ack();
    }

    assert!(manager.is_ready());
    assert_eq!(manager.metrics().reconnect_count, 1);
    assert!(script.try_accept().is_none());

    let reconnects = std::iter::from_fn(|| manager.try_recv_shard_event())
        .filter(|event| matches!(event, ShardEvent::Reconnecting { .. }))
        .count();
    assert_eq!(reconnects, 1);

    manager.disconnect().await;
    verbose_println!("  Exactly one reconnect, session resumed");
}

#[tokio::test(start_paused = true)]
async fn test_ack_records_latency() {
    let (connector, mut script) = scripted();
    let manager = Arc::new(scripted_builder(connector).build().unwrap());

    let connecting = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.connect().await })
    };

    let mut server = script.accept().await;
    server.hello(1_000);
    server.expect_op(2).await;
    server.ready(1, "session-1");
    connecting.await.unwrap().unwrap();
    assert_eq!(manager.metrics().latency, None);

    server.expect_op(1).await;
    server.heartbeat_ack();
    server.expect_op(1).await;

    assert!(manager.metrics().latency.is_some());
    assert!(manager.is_ready());

    manager.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_stops_after_disconnect() {
    let (connector, mut script) = scripted();
    let manager = Arc::new(scripted_builder(connector).build().unwrap());

    let connecting = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move { manager.connect().await })
    };

    let mut server = script.accept().await;
    server.hello(1_000);
    server.expect_op(2).await;
    server.ready(1, "session-1");
    connecting.await.unwrap().unwrap();

    manager.disconnect().await;
    assert_eq!(server.expect_close().await, Some(1000));
    assert_eq!(server.next_frame().await, None);

    tokio::time::sleep(std::time::Duration::from_secs(10)).await;
    assert_eq!(manager.phase(), ConnectionPhase::Disconnected);
    assert!(script.try_accept().is_none());

    timeout(STEP_TIMEOUT, manager.disconnect()).await.unwrap();
}
