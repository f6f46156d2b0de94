//! Session Behavior Tests
//!
//! Runs a full session against the in-memory transport, playing the engine
//! side by hand: handshake, queries, events, notifications and responses.
//! The tokio clock is paused so reconnect delays elapse instantly.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use eyex_agent::{
    CachingInteractorManager, ClientConfig, InteractorEventName, InteractorManager,
    MutableInteractorDescriptor, Session,
};
use eyex_core::{BehaviorType, EyeXError, Rect};
use eyex_transport::{MemoryPeer, MemoryServer, MemoryTransport};
use parking_lot::Mutex;
use serde_json::{json, Value};

// ============================================================================
// Helpers
// ============================================================================

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config() -> ClientConfig {
    ClientConfig {
        time_sync_interval_ms: 3_600_000,
        master_id: Some("master".to_string()),
        slave_id: Some("slave-1".to_string()),
        token: Some("t0k3n".to_string()),
        ..ClientConfig::default()
    }
}

/// Start a session, answering the handshake; returns the slave message too
async fn start(config: ClientConfig) -> (Session, MemoryServer, MemoryPeer, Value) {
    init_tracing();
    let (transport, mut server) = MemoryTransport::new();
    let engine = async {
        let mut peer = server.accept().await.expect("connection");
        let identity = next_frame(&mut peer).await;
        peer.send(json!({}));
        (peer, identity)
    };
    let (session, (peer, identity)) =
        tokio::join!(Session::start(config, Arc::new(transport)), engine);
    (session.expect("session"), server, peer, identity)
}

async fn next_frame(peer: &mut MemoryPeer) -> Value {
    tokio::time::timeout(Duration::from_secs(60), peer.recv_json())
        .await
        .expect("timed out waiting for a frame")
        .expect("peer closed")
}

/// Let the dispatch task drain everything already sent
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

fn message(message_type: &str, data: Value) -> Value {
    json!({"header": {"messageType": message_type}, "body": {"data": data}})
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

fn query(x: f64, y: f64, width: f64, height: f64) -> Value {
    message(
        "query",
        json!({
            "bounds": {"type": "rectangular", "data": {"x": x, "y": y, "width": width, "height": height}},
            "windowIds": ["main"]
        }),
    )
}

fn interactor_ids(snapshot: &Value) -> Vec<String> {
    snapshot["interactors"]
        .as_array()
        .expect("interactors")
        .iter()
        .map(|i| i["id"].as_str().expect("id").to_string())
        .collect()
}

fn recorder() -> (Arc<Mutex<Vec<Value>>>, Arc<dyn Fn(&Value) + Send + Sync>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, Arc::new(move |value: &Value| sink.lock().push(value.clone())))
}

// ============================================================================
// Bootstrap
// ============================================================================

#[tokio::test(start_paused = true)]
async fn start_identifies_as_slave_and_registers_facility_manager() {
    let (session, _server, _peer, identity) = start(config()).await;

    assert_eq!(
        identity,
        json!({"mode": "slave", "masterId": "master", "slaveId": "slave-1", "token": "t0k3n"})
    );
    assert!(session.context().is_established());
    assert_eq!(session.agent().manager_ids(), vec!["interactors1".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn start_rejects_invalid_configuration() {
    let (transport, _server) = MemoryTransport::new();
    let config = ClientConfig {
        url: "http://localhost".to_string(),
        ..ClientConfig::default()
    };

    let result = Session::start(config, Arc::new(transport)).await;
    assert_matches!(result, Err(EyeXError::Configuration { .. }));
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_reconnecting() {
    let (session, server, _peer, _) = start(config()).await;

    session.shutdown();
    settle().await;
    assert!(!session.context().is_established());

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(server.open_attempts(), 1);
}

// ============================================================================
// Queries and events
// ============================================================================

#[tokio::test(start_paused = true)]
async fn query_commits_one_snapshot_covering_every_manager() {
    let (session, _server, mut peer, _) = start(config()).await;

    let button = session
        .interactors()
        .create(10.0, 10.0, 100.0, 50.0, None, None)
        .unwrap();
    button.make_activatable(None).unwrap();

    let other = CachingInteractorManager::new(
        "mgrB",
        Arc::clone(session.context().coords()),
        None,
        100.0,
    );
    MutableInteractorDescriptor::create(&other, "x", Rect::new(300.0, 300.0, 50.0, 50.0), None, 0.0);
    session.agent().add_interactor_manager(other).unwrap();

    peer.send(query(0.0, 0.0, 1000.0, 1000.0));
    let frame = next_frame(&mut peer).await;

    assert_eq!(frame["header"]["messageType"], "request");
    assert_eq!(frame["header"]["metadata"]["requestType"], "command");
    assert_eq!(frame["body"]["commandType"], "commitSnapshot");
    let snapshot = &frame["body"]["data"];
    assert_eq!(
        interactor_ids(snapshot),
        vec![button.descriptor().interactor_id(), "mgrB/x".to_string()]
    );
    assert_eq!(snapshot["windowIds"], json!(["main"]));
    assert_eq!(snapshot["interactors"][0]["windowId"], "main");
    assert_eq!(snapshot["interactors"][0]["parentId"], "root");
    assert_eq!(snapshot["interactors"][0]["behaviors"][0]["behaviorType"], "activatable");

    settle().await;
    assert!(peer.drain_json().is_empty());
}

#[tokio::test(start_paused = true)]
async fn query_outside_every_interactor_commits_empty_snapshot() {
    let (session, _server, mut peer, _) = start(config()).await;
    session
        .interactors()
        .create(10.0, 10.0, 100.0, 50.0, None, None)
        .unwrap();

    peer.send(query(1500.0, 900.0, 60.0, 60.0));
    let frame = next_frame(&mut peer).await;

    assert_eq!(frame["body"]["commandType"], "commitSnapshot");
    assert!(interactor_ids(&frame["body"]["data"]).is_empty());
}

#[tokio::test(start_paused = true)]
async fn events_reach_only_the_manager_named_by_the_prefix() {
    let (session, _server, peer, _) = start(config()).await;

    let other = CachingInteractorManager::new(
        "mgrB",
        Arc::clone(session.context().coords()),
        None,
        100.0,
    );
    let descriptor =
        MutableInteractorDescriptor::create(&other, "x", Rect::new(0.0, 0.0, 50.0, 50.0), None, 0.0);
    session.agent().add_interactor_manager(other).unwrap();

    let (other_seen, other_sink) = recorder();
    descriptor
        .register_event_callback(
            InteractorEventName::Activated,
            Arc::new(move |v: &Value| {
                other_sink(v);
                true
            }),
        )
        .unwrap();

    let button = session
        .interactors()
        .create(0.0, 0.0, 50.0, 50.0, None, None)
        .unwrap();
    let (button_seen, button_sink) = recorder();
    button
        .activated(move |v| {
            button_sink(v);
            true
        })
        .unwrap();

    let activated = json!([{"behaviorType": "activatable", "data": {"activatableEventType": "activated"}}]);
    peer.send(message("event", json!({"interactorId": "mgrB/x", "behaviors": activated.clone()})));
    peer.send(message("event", json!({"interactorId": "mgrC/x", "behaviors": activated.clone()})));
    settle().await;

    assert_eq!(other_seen.lock().len(), 1);
    assert!(button_seen.lock().is_empty());

    peer.send(message(
        "event",
        json!({"interactorId": button.descriptor().interactor_id(), "behaviors": activated}),
    ));
    settle().await;
    assert_eq!(other_seen.lock().len(), 1);
    assert_eq!(*button_seen.lock(), vec![Value::Null]);
}

#[tokio::test(start_paused = true)]
async fn gaze_events_map_to_enter_and_leave() {
    let (session, _server, peer, _) = start(config()).await;
    let area = session
        .interactors()
        .create(0.0, 0.0, 50.0, 50.0, None, None)
        .unwrap();
    area.make_gaze_aware(None, None).unwrap();

    let log = Arc::new(Mutex::new(Vec::new()));
    let enter = Arc::clone(&log);
    let leave = Arc::clone(&log);
    area.gaze_enter(move |_| {
        enter.lock().push("enter");
        true
    })
    .unwrap()
    .gaze_leave(move |_| {
        leave.lock().push("leave");
        true
    })
    .unwrap();

    let id = area.descriptor().interactor_id();
    for has_gaze in [true, false] {
        peer.send(message(
            "event",
            json!({"interactorId": id, "behaviors": [{"behaviorType": "gazeAware", "data": {"hasGaze": has_gaze}}]}),
        ));
    }
    settle().await;

    assert_eq!(*log.lock(), vec!["enter", "leave"]);
}

// ============================================================================
// Interactor lifecycle
// ============================================================================

#[tokio::test(start_paused = true)]
async fn removed_interactor_rejects_configuration_and_leaves_cache() {
    let (session, _server, mut peer, _) = start(config()).await;
    let interactors = session.interactors();

    let panel = interactors
        .create(0.0, 0.0, 200.0, 200.0, None, None)
        .unwrap();
    panel.remove().unwrap();

    assert!(!panel.is_valid());
    assert_matches!(panel.set_bounds(0.0, 0.0, 10.0, 10.0), Err(EyeXError::InvalidConfiguration));
    assert_matches!(panel.bounds(), Err(EyeXError::InvalidConfiguration));
    assert_matches!(panel.remove(), Err(EyeXError::InvalidConfiguration));
    assert_matches!(
        interactors.create(0.0, 0.0, 10.0, 10.0, Some(&panel), None),
        Err(EyeXError::InvalidConfiguration)
    );
    assert!(interactors.get(panel.id()).is_none());
    assert!(interactors
        .manager()
        .find_interactor_descriptors(&Rect::new(0.0, 0.0, 1920.0, 1080.0))
        .is_empty());

    peer.send(query(0.0, 0.0, 1000.0, 1000.0));
    let frame = next_frame(&mut peer).await;
    assert!(interactor_ids(&frame["body"]["data"]).is_empty());
}

#[tokio::test(start_paused = true)]
async fn moved_interactor_is_found_at_its_new_place() {
    let (session, _server, mut peer, _) = start(config()).await;
    let interactors = session.interactors();

    let parent = interactors
        .create(0.0, 0.0, 400.0, 400.0, None, None)
        .unwrap();
    let child = interactors
        .create(10.0, 10.0, 20.0, 20.0, Some(&parent), Some(1.0))
        .unwrap();
    child.set_bounds(1500.0, 900.0, 20.0, 20.0).unwrap();

    peer.send(query(1400.0, 800.0, 200.0, 200.0));
    let frame = next_frame(&mut peer).await;
    let snapshot = &frame["body"]["data"];

    // The parent comes along although it lies outside the query
    assert_eq!(
        interactor_ids(snapshot),
        vec![
            child.descriptor().interactor_id(),
            parent.descriptor().interactor_id()
        ]
    );
    assert_eq!(snapshot["interactors"][0]["parentId"], json!(parent.descriptor().interactor_id()));
    assert_eq!(snapshot["interactors"][0]["z"], json!(1.0));
}

// ============================================================================
// States
// ============================================================================

#[tokio::test(start_paused = true)]
async fn get_state_resolves_with_the_bag_data() {
    let (session, _server, mut peer, _) = start(config()).await;

    let pending = session.states().get("eyex.userPresence");
    let frame = next_frame(&mut peer).await;
    assert_eq!(
        frame["body"],
        json!({"commandType": "getState", "data": {"statePath": "eyex.userPresence"}})
    );

    peer.send(response(
        request_id_of(&frame),
        json!({"result": "ok", "data": {"statePath": "eyex.userPresence", "data": "present"}}),
    ));
    assert_eq!(pending.await.unwrap(), json!("present"));
}

#[tokio::test(start_paused = true)]
async fn set_state_fails_on_error_result() {
    let (session, _server, mut peer, _) = start(config()).await;

    let pending = session.states().set("eyex.profile", json!({"name": "guest"}));
    let frame = next_frame(&mut peer).await;
    assert_eq!(frame["body"]["commandType"], "setState");
    assert_eq!(
        frame["body"]["data"],
        json!({"statePath": "eyex.profile", "data": {"name": "guest"}})
    );

    peer.send(response(request_id_of(&frame), json!({"result": "error"})));
    assert_matches!(pending.await, Err(EyeXError::RequestFailed));
}

#[tokio::test(start_paused = true)]
async fn state_observers_register_once_per_path() {
    let (session, _server, mut peer, _) = start(config()).await;
    let states = session.states();

    let first = states.subscribe("eyex.a.b", |_| {});
    let second = states.subscribe("eyex.a.b", |_| {});
    let frame = next_frame(&mut peer).await;
    assert_eq!(
        frame["body"],
        json!({"commandType": "registerStateObserver", "data": {"statePath": "eyex.a.b"}})
    );
    settle().await;
    assert!(peer.drain_json().is_empty());
    assert_eq!(session.context().state_observer_count("eyex.a.b"), 2);

    assert!(states.unsubscribe(first));
    settle().await;
    assert!(peer.drain_json().is_empty());

    assert!(states.unsubscribe(second));
    let frame = next_frame(&mut peer).await;
    assert_eq!(frame["body"]["commandType"], "unregisterStateObserver");
    assert_eq!(session.context().state_observer_count("eyex.a.b"), 0);
    assert!(!states.unsubscribe(second));
}

#[tokio::test(start_paused = true)]
async fn state_changes_reach_subscribers_under_the_changed_path() {
    let (session, _server, peer, _) = start(config()).await;
    let states = session.states();

    let (nested, nested_sink) = recorder();
    let (unrelated, unrelated_sink) = recorder();
    states.subscribe("eyex.a.b", move |v| nested_sink(v));
    states.subscribe("eyex.c", move |v| unrelated_sink(v));

    peer.send(message(
        "notification",
        json!({"notificationType": "stateChanged", "data": {"statePath": "eyex.a", "data": 5}}),
    ));
    // A change below the subscribed path does not affect it
    peer.send(message(
        "notification",
        json!({"notificationType": "stateChanged", "data": {"statePath": "eyex.a.b.c", "data": 6}}),
    ));
    settle().await;

    assert_eq!(*nested.lock(), vec![json!(5)]);
    assert!(unrelated.lock().is_empty());
}

// ============================================================================
// Streams
// ============================================================================

#[tokio::test(start_paused = true)]
async fn gaze_stream_commits_global_interactor_and_delivers_data() {
    let (session, _server, mut peer, _) = start(config()).await;
    let streams = session.streams();

    let (seen, sink) = recorder();
    streams.gaze_point_data(None, Some(sink));
    let frame = next_frame(&mut peer).await;
    let snapshot = &frame["body"]["data"];
    let provider = streams
        .provider(BehaviorType::GazePointData, "lightlyFiltered")
        .expect("provider");

    assert_eq!(snapshot["windowIds"], json!(["global"]));
    assert_eq!(snapshot["bounds"]["boundsType"], "none");
    let interactor = &snapshot["interactors"][0];
    assert_eq!(interactor["id"], provider.interactor_id());
    assert_eq!(interactor["isDeleted"], false);
    assert_eq!(interactor["windowId"], "global");
    assert_eq!(interactor["behaviors"][0]["behaviorType"], "gazePointData");

    let point = json!({"x": 10.5, "y": 20.0, "timestamp": 1234.0});
    peer.send(message(
        "event",
        json!({"interactorId": provider.interactor_id(), "behaviors": [{"behaviorType": "gazePointData", "data": point}]}),
    ));
    settle().await;
    assert_eq!(*seen.lock(), vec![point]);

    streams.gaze_point_data(None, None);
    let frame = next_frame(&mut peer).await;
    assert_eq!(frame["body"]["data"]["interactors"][0]["isDeleted"], true);
    assert!(!provider.is_enabled());
    assert_eq!(streams.active_streams(), 0);
}

#[tokio::test(start_paused = true)]
async fn enabled_stream_is_recommitted_after_reconnect() {
    let (session, mut server, mut peer, identity) = start(config()).await;
    let streams = session.streams();

    let (_seen, sink) = recorder();
    streams.fixation_data(None, Some(sink));
    let first = next_frame(&mut peer).await;
    let id = first["body"]["data"]["interactors"][0]["id"].clone();

    peer.close();
    let mut peer = server.accept().await.expect("reconnect");
    assert_eq!(next_frame(&mut peer).await, identity);
    peer.send(json!({}));

    let frame = next_frame(&mut peer).await;
    let interactor = &frame["body"]["data"]["interactors"][0];
    assert_eq!(interactor["id"], id);
    assert_eq!(interactor["isDeleted"], false);
    assert_eq!(interactor["behaviors"][0]["behaviorType"], "fixationData");
}

#[tokio::test(start_paused = true)]
async fn restarting_a_stream_replaces_its_provider() {
    let (session, _server, mut peer, _) = start(config()).await;
    let streams = session.streams();

    let (_first_seen, first_sink) = recorder();
    let (_second_seen, second_sink) = recorder();
    streams.eye_position_data(Some(first_sink));
    let first = next_frame(&mut peer).await;
    streams.eye_position_data(Some(second_sink));
    let removed = next_frame(&mut peer).await;
    let second = next_frame(&mut peer).await;

    let first_id = &first["body"]["data"]["interactors"][0]["id"];
    assert_eq!(removed["body"]["data"]["interactors"][0]["id"], *first_id);
    assert_eq!(removed["body"]["data"]["interactors"][0]["isDeleted"], true);
    assert_ne!(second["body"]["data"]["interactors"][0]["id"], *first_id);
    assert_eq!(streams.active_streams(), 1);
}
