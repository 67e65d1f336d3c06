//! Outbound command tests: wire format, rate limiting and rejection

#[macro_use]
mod common;

use common::{connect_ready, scripted, scripted_builder, STEP_TIMEOUT};
use gateway_shard::{
    Activity, ConnectionPhase, FixedDelay, GatewayError, RequestGuildMembers, Status,
    UpdatePresence, VoiceStateUpdate, WsMessage,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

#[tokio::test]
async fn test_presence_update_reaches_gateway() {
    verbose_println!("Testing presence update...");

    let (connector, mut script) = scripted();
    let manager = Arc::new(scripted_builder(connector).build().unwrap());
    let mut server = connect_ready(&manager, &mut script, "session-1").await;

    manager
        .update_presence(UpdatePresence::new(Status::Dnd).with_activity(Activity::playing("chess")))
        .await
        .unwrap();

    let frame = server.expect_op(3).await;
    assert_eq!(frame["d"]["status"], "dnd");
    assert_eq!(frame["d"]["activities"][0]["name"], "chess");
    assert_eq!(frame["d"]["afk"], false);

    let budget = manager.rate_budget();
    assert_eq!(budget.tokens, budget.capacity - 1);
    assert!(budget.refill_at.is_some());

    manager.disconnect().await;
    verbose_println!("  Presence sent as op 3");
}

#[tokio::test]
async fn test_voice_state_and_member_requests() {
    let (connector, mut script) = scripted();
    let manager = Arc::new(scripted_builder(connector).build().unwrap());
    let mut server = connect_ready(&manager, &mut script, "session-1").await;

    manager
        .update_voice_state(VoiceStateUpdate {
            guild_id: "41771983423143937".into(),
            channel_id: Some("127121515262115840".into()),
            self_mute: false,
            self_deaf: true,
        })
        .await
        .unwrap();

    let frame = server.expect_op(4).await;
    assert_eq!(frame["d"]["guild_id"], "41771983423143937");
    assert_eq!(frame["d"]["self_deaf"], true);

    manager
        .request_guild_members(RequestGuildMembers::by_query("41771983423143937", "", 0).with_nonce("n1"))
        .await
        .unwrap();

    let frame = server.expect_op(8).await;
    assert_eq!(frame["d"]["query"], "");
    assert_eq!(frame["d"]["limit"], 0);
    assert_eq!(frame["d"]["nonce"], "n1");
    assert!(frame["d"].get("user_ids").is_none());

    manager.disconnect().await;
}

#[tokio::test(start_paused = true)]
async fn test_command_over_budget_is_rate_limited() {
    verbose_println!("Testing command budget...");

    let (connector, mut script) = scripted();
    let manager = Arc::new(
        scripted_builder(connector)
            .command_rate_limit(120, Duration::from_secs(60))
            .command_timeout(Duration::from_secs(1))
            .build()
            .unwrap(),
    );
    let mut server = connect_ready(&manager, &mut script, "session-1").await;

    for _ in 0..120 {
        manager
            .update_presence(UpdatePresence::new(Status::Online))
            .await
            .unwrap();
    }
    assert_eq!(manager.rate_budget().tokens, 0);

    let started = tokio::time::Instant::now();
    let err = manager
        .update_presence(UpdatePresence::new(Status::Online))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::RateLimited(_)));
    assert!(started.elapsed() >= Duration::from_secs(1));

    for _ in 0..120 {
        server.expect_op(3).await;
    }
    // The rejected command never went out
    while let Some(frame) = server.try_frame() {
        assert!(!matches!(frame, WsMessage::Text(ref text) if text.contains("\"op\":3")));
    }

    manager.disconnect().await;
    verbose_println!("  121st command rejected with {}", err);
}

#[tokio::test]
async fn test_waiting_command_sent_when_token_frees() {
    let (connector, mut script) = scripted();
    let manager = Arc::new(
        scripted_builder(connector)
            .command_rate_limit(1, Duration::from_millis(200))
            .command_timeout(Duration::from_secs(2))
            .build()
            .unwrap(),
    );
    let mut server = connect_ready(&manager, &mut script, "session-1").await;

    manager
        .update_presence(UpdatePresence::new(Status::Online))
        .await
        .unwrap();
    server.expect_op(3).await;

    let started = std::time::Instant::now();
    manager
        .update_presence(UpdatePresence::new(Status::Idle))
        .await
        .unwrap();
    assert!(started.elapsed() >= Duration::from_millis(150));

    let frame = server.expect_op(3).await;
    assert_eq!(frame["d"]["status"], "idle");

    manager.disconnect().await;
}

#[tokio::test]
async fn test_disconnect_releases_waiting_command() {
    let (connector, mut script) = scripted();
    let manager = Arc::new(
        scripted_builder(connector)
            .command_rate_limit(1, Duration::from_secs(3600))
            .command_timeout(Duration::from_secs(3600))
            .build()
            .unwrap(),
    );
    let _server = connect_ready(&manager, &mut script, "session-1").await;

    manager
        .update_presence(UpdatePresence::new(Status::Online))
        .await
        .unwrap();

    let waiting = {
        let manager = Arc::clone(&manager);
        tokio::spawn(async move {
            manager
                .update_presence(UpdatePresence::new(Status::Idle))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    manager.disconnect().await;
    let result = timeout(STEP_TIMEOUT, waiting).await.unwrap().unwrap();
    assert_eq!(result, Err(GatewayError::Disconnected));
}

#[tokio::test]
async fn test_command_while_reconnecting_is_rejected() {
    let (connector, mut script) = scripted();
    let manager = Arc::new(
        scripted_builder(connector)
            .reconnect_strategy(FixedDelay::new(Duration::from_secs(3600), None))
            .build()
            .unwrap(),
    );
    let server = connect_ready(&manager, &mut script, "session-1").await;
    server.drop_connection();

    timeout(STEP_TIMEOUT, manager.wait_for_phase(ConnectionPhase::Reconnecting))
        .await
        .unwrap();

    let budget_before = manager.rate_budget().tokens;
    let err = manager
        .update_presence(UpdatePresence::new(Status::Online))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::NotConnected(_)));
    assert_eq!(manager.rate_budget().tokens, budget_before);

    manager.disconnect().await;
}

#[tokio::test]
async fn test_budget_restored_after_ready() {
    let (connector, mut script) = scripted();
    let manager = Arc::new(
        scripted_builder(connector)
            .command_rate_limit(2, Duration::from_secs(3600))
            .build()
            .unwrap(),
    );
    let mut server = connect_ready(&manager, &mut script, "session-1").await;

    manager
        .update_presence(UpdatePresence::new(Status::Online))
        .await
        .unwrap();
    manager
        .update_presence(UpdatePresence::new(Status::Online))
        .await
        .unwrap();
    assert_eq!(manager.rate_budget().tokens, 0);

    server.request_reconnect();
    assert_eq!(server.expect_close().await, Some(4000));

    let mut server = script.accept().await;
    server.hello(45_000);
    server.expect_op(6).await;
    server.resumed(2);
    timeout(STEP_TIMEOUT, manager.wait_for_phase(ConnectionPhase::Ready))
        .await
        .unwrap();

    assert_eq!(manager.rate_budget().tokens, 2);
    manager.disconnect().await;
}
