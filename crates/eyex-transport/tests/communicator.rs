//! Communicator Behavior Tests
//!
//! Drives the communicator against the in-memory transport, with the tokio
//! clock paused so reconnect and time-sync intervals elapse instantly.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use eyex_core::{EyeXError, MessageType, RequestType, ServerClock};
use eyex_transport::{
    Communicator, CommunicatorConfig, CommunicatorEvent, ConnectionState, MemoryPeer,
    MemoryServer, MemoryTransport,
};
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedReceiver;

// ============================================================================
// Helpers
// ============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config() -> CommunicatorConfig {
    CommunicatorConfig {
        url: "mem://engine".to_string(),
        ..CommunicatorConfig::default()
    }
}

fn setup(
    config: CommunicatorConfig,
) -> (
    Communicator,
    UnboundedReceiver<CommunicatorEvent>,
    MemoryServer,
) {
    init_tracing();
    let (transport, server) = MemoryTransport::new();
    let (communicator, events) =
        Communicator::new(config, Arc::new(transport), Arc::new(ServerClock::new()));
    (communicator, events, server)
}

async fn next_event(events: &mut UnboundedReceiver<CommunicatorEvent>) -> CommunicatorEvent {
    tokio::time::timeout(Duration::from_secs(60), events.recv())
        .await
        .expect("timed out waiting for communicator event")
        .expect("event channel closed")
}

async fn establish(
    communicator: &Communicator,
    events: &mut UnboundedReceiver<CommunicatorEvent>,
    server: &mut MemoryServer,
    handshake: Value,
) -> MemoryPeer {
    communicator.open();
    let peer = server.accept().await.expect("connection");
    assert_matches!(next_event(events).await, CommunicatorEvent::Connected);
    peer.send(handshake);
    assert_matches!(next_event(events).await, CommunicatorEvent::Established(_));
    peer
}

fn response(request_id: u64, body: Value) -> Value {
    json!({
        "header": {"messageType": "response", "metadata": {"requestId": request_id}},
        "body": body
    })
}

fn request_id_of(frame: &Value) -> u64 {
    frame["header"]["metadata"]["requestId"]
        .as_u64()
        .expect("request id")
}

// ============================================================================
// Connection lifecycle
// ============================================================================

#[tokio::test(start_paused = true)]
async fn handshake_establishes_and_replaces_constants() {
    let (communicator, mut events, mut server) = setup(config());
    communicator.open();
    let peer = server.accept().await.unwrap();

    assert_matches!(next_event(&mut events).await, CommunicatorEvent::Connected);
    assert_eq!(communicator.state(), ConnectionState::Connected);

    peer.send(json!({"constants": {"messageType": {"query": 9}}}));
    let constants = match next_event(&mut events).await {
        CommunicatorEvent::Established(constants) => constants,
        other => panic!("expected Established, got {other:?}"),
    };
    assert_eq!(constants.encode(MessageType::Query), json!(9));
    assert_eq!(communicator.constants().encode(MessageType::Query), json!(9));
    assert!(communicator.is_established());
}

#[tokio::test(start_paused = true)]
async fn close_before_handshake_disconnects_once_and_rehandshakes() {
    let (communicator, mut events, mut server) = setup(config());
    communicator.open();
    let first = server.accept().await.unwrap();
    assert_matches!(next_event(&mut events).await, CommunicatorEvent::Connected);

    first.close();
    assert_matches!(next_event(&mut events).await, CommunicatorEvent::Disconnected);
    // The next thing reported is the reconnect, not a second disconnect
    let second = server.accept().await.unwrap();
    assert_matches!(next_event(&mut events).await, CommunicatorEvent::Connected);

    second.send(json!({"constants": {"messageType": {"event": 7}}}));
    assert_matches!(next_event(&mut events).await, CommunicatorEvent::Established(_));

    second.send(json!({"header": {"messageType": 7}, "body": {}}));
    match next_event(&mut events).await {
        CommunicatorEvent::Message(message) => assert_eq!(message.message_type, MessageType::Event),
        other => panic!("expected Message, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn failed_attempts_retry_on_fixed_interval_without_disconnect() {
    let (communicator, mut events, mut server) = setup(config());
    server.set_accepting(false);
    communicator.open();

    tokio::time::sleep(Duration::from_millis(4_500)).await;
    assert_eq!(server.open_attempts(), 3);
    assert!(events.try_recv().is_err());

    server.set_accepting(true);
    let _peer = server.accept().await.unwrap();
    assert_matches!(next_event(&mut events).await, CommunicatorEvent::Connected);
    assert_eq!(server.open_attempts(), 4);
}

#[tokio::test(start_paused = true)]
async fn close_twice_leaves_communicator_closed() {
    let (communicator, mut events, mut server) = setup(config());
    let _peer = establish(&communicator, &mut events, &mut server, json!({})).await;

    communicator.close();
    communicator.close();

    assert_matches!(next_event(&mut events).await, CommunicatorEvent::Disconnected);
    assert!(events.try_recv().is_err());
    assert_eq!(communicator.state(), ConnectionState::Closed);
    assert!(!communicator.is_open());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(server.open_attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn open_is_idempotent() {
    let (communicator, mut events, mut server) = setup(config());
    communicator.open();
    communicator.open();
    let _peer = server.accept().await.unwrap();
    assert_matches!(next_event(&mut events).await, CommunicatorEvent::Connected);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(server.open_attempts(), 1);
    assert!(server.try_accept().is_none());
}

// ============================================================================
// Requests
// ============================================================================

#[tokio::test(start_paused = true)]
async fn request_without_connection_fails_without_sending() {
    let (communicator, _events, mut server) = setup(config());

    let result = communicator
        .send_request(RequestType::Command, json!({"commandType": "getState"}))
        .await;

    assert_matches!(result, Err(EyeXError::NotConnected));
    assert_eq!(server.open_attempts(), 0);
    assert!(server.try_accept().is_none());
    assert_eq!(communicator.pending_requests(), 0);
}

#[tokio::test(start_paused = true)]
async fn response_resolves_matching_request() {
    let (communicator, mut events, mut server) = setup(config());
    let mut peer = establish(&communicator, &mut events, &mut server, json!({})).await;

    let pending = communicator.send_request(RequestType::Command, json!({"commandType": "getState"}));
    let frame = peer.recv_json().await.unwrap();
    assert_eq!(frame["header"]["messageType"], json!("request"));
    assert_eq!(frame["header"]["metadata"]["requestType"], json!("command"));

    // Responses nobody waits for are dropped silently
    peer.send(response(999, json!({"result": "ok"})));
    peer.send(response(request_id_of(&frame), json!({"result": "ok", "data": 5})));

    assert_eq!(pending.await.unwrap(), json!({"result": "ok", "data": 5}));
    assert!(events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn request_ids_are_unique() {
    let (communicator, mut events, mut server) = setup(config());
    let mut peer = establish(&communicator, &mut events, &mut server, json!({})).await;

    let _a = communicator.send_request(RequestType::Custom, json!(1));
    let _b = communicator.send_request(RequestType::Custom, json!(2));
    let frames = peer.drain_json();

    assert_eq!(frames.len(), 2);
    assert_ne!(request_id_of(&frames[0]), request_id_of(&frames[1]));
    assert_eq!(communicator.pending_requests(), 2);
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_pending_requests() {
    let (communicator, mut events, mut server) = setup(config());
    let peer = establish(&communicator, &mut events, &mut server, json!({})).await;

    let pending = communicator.send_request(RequestType::Command, json!({}));
    peer.close();

    assert_matches!(pending.await, Err(EyeXError::RequestCancelled { .. }));
    assert_matches!(next_event(&mut events).await, CommunicatorEvent::Disconnected);
    assert_eq!(communicator.pending_requests(), 0);
}

#[tokio::test(start_paused = true)]
async fn close_cancels_pending_requests() {
    let (communicator, mut events, mut server) = setup(config());
    let _peer = establish(&communicator, &mut events, &mut server, json!({})).await;

    let pending = communicator.send_request(RequestType::Command, json!({}));
    communicator.close();

    assert_matches!(pending.await, Err(EyeXError::RequestCancelled { .. }));
}

#[tokio::test(start_paused = true)]
async fn requests_wait_indefinitely_by_default() {
    let (communicator, mut events, mut server) = setup(CommunicatorConfig {
        time_sync_interval: Duration::from_secs(86_400),
        ..config()
    });
    let _peer = establish(&communicator, &mut events, &mut server, json!({})).await;

    let pending = communicator.send_request(RequestType::Command, json!({}));
    let waited = tokio::time::timeout(Duration::from_secs(3_600), pending).await;

    assert!(waited.is_err());
    assert_eq!(communicator.pending_requests(), 1);
}

#[tokio::test(start_paused = true)]
async fn opt_in_request_timeout_rejects_and_forgets_request() {
    let (communicator, mut events, mut server) = setup(CommunicatorConfig {
        request_timeout: Some(Duration::from_secs(1)),
        ..config()
    });
    let _peer = establish(&communicator, &mut events, &mut server, json!({})).await;

    let result = communicator
        .send_request(RequestType::Command, json!({}))
        .await;

    assert_matches!(result, Err(EyeXError::RequestTimeout(_)));
    assert_eq!(communicator.pending_requests(), 0);
}

// ============================================================================
// Messages and time sync
// ============================================================================

#[tokio::test(start_paused = true)]
async fn inbound_messages_are_forwarded_in_order() {
    let (communicator, mut events, mut server) = setup(config());
    let peer = establish(&communicator, &mut events, &mut server, json!({})).await;

    peer.send(json!({"header": {"messageType": "query"}, "body": {"n": 1}}));
    peer.send(json!("not an envelope"));
    peer.send(json!({"header": {"messageType": "notification"}, "body": {"n": 2}}));

    match next_event(&mut events).await {
        CommunicatorEvent::Message(m) => assert_eq!(m.message_type, MessageType::Query),
        other => panic!("unexpected {other:?}"),
    }
    match next_event(&mut events).await {
        CommunicatorEvent::Message(m) => {
            assert_eq!(m.message_type, MessageType::Notification);
            assert_eq!(m.body, json!({"n": 2}));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn raw_frames_bypass_the_envelope() {
    let (communicator, _events, mut server) = setup(config());
    communicator.open();
    let mut peer = server.accept().await.unwrap();
    tokio::task::yield_now().await;

    communicator
        .send_raw(json!({"mode": "slave", "slaveId": "s1"}))
        .unwrap();
    assert_eq!(
        peer.recv_json().await,
        Some(json!({"mode": "slave", "slaveId": "s1"}))
    );
}

#[tokio::test(start_paused = true)]
async fn time_sync_updates_the_clock() {
    let (communicator, mut events, mut server) = setup(config());
    let mut peer = establish(&communicator, &mut events, &mut server, json!({})).await;

    let frame = peer.recv_json().await.unwrap();
    assert_eq!(frame["header"]["metadata"]["requestType"], json!("timeSync"));

    peer.send(response(request_id_of(&frame), json!({"timeDiff": 1500.0})));
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(communicator.clock().time_diff(), 1500.0);
}

#[tokio::test(start_paused = true)]
async fn engine_time_sync_interval_overrides_config() {
    let (communicator, mut events, mut server) = setup(CommunicatorConfig {
        time_sync_interval: Duration::from_secs(86_400),
        ..config()
    });
    let mut peer = establish(
        &communicator,
        &mut events,
        &mut server,
        json!({"constants": {"timeSyncIntervalMs": 1000}}),
    )
    .await;
    let start = tokio::time::Instant::now();

    let frame = tokio::time::timeout(Duration::from_secs(2), peer.recv_json())
        .await
        .expect("time sync within the engine interval")
        .unwrap();
    assert_eq!(frame["header"]["metadata"]["requestType"], json!("timeSync"));
    assert!(start.elapsed() >= Duration::from_secs(1));
}

#[tokio::test(start_paused = true)]
async fn engine_reconnect_interval_applies_after_connection_loss() {
    let (communicator, mut events, mut server) = setup(config());
    let peer = establish(
        &communicator,
        &mut events,
        &mut server,
        json!({"constants": {"reconnectIntervalMs": 500}}),
    )
    .await;

    peer.close();
    assert_matches!(next_event(&mut events).await, CommunicatorEvent::Disconnected);
    let lost_at = tokio::time::Instant::now();

    let _second = server.accept().await.unwrap();
    assert_matches!(next_event(&mut events).await, CommunicatorEvent::Connected);
    let waited = lost_at.elapsed();
    assert!(waited >= Duration::from_millis(500), "reconnected after {waited:?}");
    assert!(waited < Duration::from_secs(2), "reconnected after {waited:?}");
}
