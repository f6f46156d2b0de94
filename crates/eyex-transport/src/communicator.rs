//! Reconnecting request/response channel to the engine
//!
//! The communicator walks `Closed -> Connecting -> Connected -> Established`:
//!
//! - `open()` starts a single connect loop with no initial delay. Failed
//!   attempts and lost connections are retried after a fixed interval for as
//!   long as the communicator stays open. The engine may replace that
//!   interval with a `reconnectIntervalMs` handshake setting.
//! - The first frame on a fresh connection is the handshake. It carries the
//!   protocol constants, which replace the previous ones as a whole.
//! - Requests are correlated by a locally generated id. A request made while
//!   disconnected fails without touching the socket; pending requests are
//!   cancelled when the connection drops or the communicator closes.
//! - Once established, a time-sync request runs at a fixed interval and
//!   updates the shared [`ServerClock`]. A `timeSyncIntervalMs` handshake
//!   setting takes precedence over the configured interval.
//!
//! Connection changes and every non-response message are reported in order
//! on the event channel returned by [`Communicator::new`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use eyex_core::constants::{
    DEFAULT_RECONNECT_INTERVAL_MS, DEFAULT_TIME_SYNC_INTERVAL_MS, DEFAULT_WEBSOCKET_URL,
    RECONNECT_INTERVAL_SETTING, TIME_SYNC_INTERVAL_SETTING,
};
use eyex_core::{
    EyeXError, Message, MessageType, ProtocolConstants, ProtocolEnum, Result, ServerClock,
    WebRequestType,
};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, trace, warn};

use crate::transport::{OutboundFrame, Transport, TransportEvent, TransportLink};

/// Communicator configuration
#[derive(Debug, Clone)]
pub struct CommunicatorConfig {
    /// Engine endpoint
    pub url: String,
    /// Delay between connection attempts
    pub reconnect_interval: Duration,
    /// Delay between time-sync requests once established
    pub time_sync_interval: Duration,
    /// Reject requests that stay unanswered this long; `None` waits until
    /// the connection drops
    pub request_timeout: Option<Duration>,
}

impl Default for CommunicatorConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_WEBSOCKET_URL.to_string(),
            reconnect_interval: Duration::from_millis(DEFAULT_RECONNECT_INTERVAL_MS),
            time_sync_interval: Duration::from_millis(DEFAULT_TIME_SYNC_INTERVAL_MS),
            request_timeout: None,
        }
    }
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not open
    Closed,
    /// Open, waiting for a connection
    Connecting,
    /// Socket up, handshake not yet received
    Connected,
    /// Handshake received
    Established,
}

/// Notifications produced by the communicator
#[derive(Debug, Clone)]
pub enum CommunicatorEvent {
    /// A connection was made
    Connected,
    /// A previously made connection was lost or closed
    Disconnected,
    /// The handshake arrived; carries the constants now in force
    Established(Arc<ProtocolConstants>),
    /// A non-response message arrived
    Message(Message),
}

/// Future of a request's response body
pub type ResponseFuture = BoxFuture<'static, Result<Value>>;

type PendingRequests = HashMap<u64, oneshot::Sender<Result<Value>>>;

struct Inner {
    is_open: bool,
    state: ConnectionState,
    /// Bumped on every open and close so stale loops stop touching state
    generation: u64,
    outbound: Option<mpsc::UnboundedSender<OutboundFrame>>,
    pending: PendingRequests,
    next_request_id: u64,
    constants: Arc<ProtocolConstants>,
    connect_task: Option<JoinHandle<()>>,
    time_sync_task: Option<JoinHandle<()>>,
}

struct Shared {
    config: CommunicatorConfig,
    transport: Arc<dyn Transport>,
    clock: Arc<ServerClock>,
    events: mpsc::UnboundedSender<CommunicatorEvent>,
    inner: Mutex<Inner>,
}

/// Handle to the engine connection; clones share the connection.
#[derive(Clone)]
pub struct Communicator {
    shared: Arc<Shared>,
}

impl Communicator {
    /// Create a closed communicator and the receiver of its events
    pub fn new(
        config: CommunicatorConfig,
        transport: Arc<dyn Transport>,
        clock: Arc<ServerClock>,
    ) -> (Self, mpsc::UnboundedReceiver<CommunicatorEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let communicator = Self {
            shared: Arc::new(Shared {
                config,
                transport,
                clock,
                events: events_tx,
                inner: Mutex::new(Inner {
                    is_open: false,
                    state: ConnectionState::Closed,
                    generation: 0,
                    outbound: None,
                    pending: HashMap::new(),
                    next_request_id: 0,
                    constants: Arc::new(ProtocolConstants::default()),
                    connect_task: None,
                    time_sync_task: None,
                }),
            }),
        };
        (communicator, events_rx)
    }

    /// Start connecting; does nothing if already open
    pub fn open(&self) {
        let mut inner = self.shared.inner.lock();
        if inner.is_open {
            return;
        }
        inner.is_open = true;
        inner.generation += 1;
        inner.state = ConnectionState::Connecting;
        let generation = inner.generation;
        info!(url = %self.shared.config.url, "Opening engine connection");
        inner.connect_task = Some(tokio::spawn(self.clone().run(generation)));
    }

    /// Stop connecting and close the active connection.
    ///
    /// Pending requests are cancelled. Closing twice is harmless.
    pub fn close(&self) {
        let (was_connected, pending, outbound, tasks) = {
            let mut inner = self.shared.inner.lock();
            if !inner.is_open {
                return;
            }
            inner.is_open = false;
            inner.generation += 1;
            let was_connected = matches!(
                inner.state,
                ConnectionState::Connected | ConnectionState::Established
            );
            inner.state = ConnectionState::Closed;
            (
                was_connected,
                std::mem::take(&mut inner.pending),
                inner.outbound.take(),
                [inner.connect_task.take(), inner.time_sync_task.take()],
            )
        };

        for task in tasks.into_iter().flatten() {
            task.abort();
        }
        if let Some(outbound) = outbound {
            let _ = outbound.send(OutboundFrame::Close);
        }
        info!("Engine connection closed");
        if was_connected {
            self.emit(CommunicatorEvent::Disconnected);
        }
        cancel_pending(pending, "communicator closed");
    }

    /// Whether the application wants a connection
    pub fn is_open(&self) -> bool {
        self.shared.inner.lock().is_open
    }

    /// Whether a socket is up (handshake or not)
    pub fn is_connected(&self) -> bool {
        self.shared.inner.lock().outbound.is_some()
    }

    /// Whether the handshake has been received on the current connection
    pub fn is_established(&self) -> bool {
        self.state() == ConnectionState::Established
    }

    /// Current state
    pub fn state(&self) -> ConnectionState {
        self.shared.inner.lock().state
    }

    /// Constants in force
    pub fn constants(&self) -> Arc<ProtocolConstants> {
        Arc::clone(&self.shared.inner.lock().constants)
    }

    /// Clock updated by time sync
    pub fn clock(&self) -> &Arc<ServerClock> {
        &self.shared.clock
    }

    /// Configuration
    pub fn config(&self) -> &CommunicatorConfig {
        &self.shared.config
    }

    /// Number of requests awaiting a response
    pub fn pending_requests(&self) -> usize {
        self.shared.inner.lock().pending.len()
    }

    /// Send a request and return the future of its response body.
    ///
    /// The request is queued on the socket before this returns. Without a
    /// connection the future fails with [`EyeXError::NotConnected`] and
    /// nothing is sent.
    pub fn send_request<K: ProtocolEnum>(&self, request_type: K, body: Value) -> ResponseFuture {
        let (tx, rx) = oneshot::channel();
        let queued = self.queue_request(request_type, body, tx);
        let timeout = self.shared.config.request_timeout;
        let shared = Arc::clone(&self.shared);

        Box::pin(async move {
            let request_id = queued?;
            let outcome = match timeout {
                None => rx.await,
                Some(limit) => match tokio::time::timeout(limit, rx).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        shared.inner.lock().pending.remove(&request_id);
                        debug!(request_id, "Request timed out");
                        return Err(EyeXError::RequestTimeout(limit));
                    }
                },
            };
            outcome.unwrap_or_else(|_| Err(EyeXError::cancelled("response channel dropped")))
        })
    }

    fn queue_request<K: ProtocolEnum>(
        &self,
        request_type: K,
        body: Value,
        responder: oneshot::Sender<Result<Value>>,
    ) -> Result<u64> {
        let mut inner = self.shared.inner.lock();
        let outbound = inner.outbound.clone().ok_or(EyeXError::NotConnected)?;

        inner.next_request_id += 1;
        let request_id = inner.next_request_id;
        let message = Message::request(inner.constants.encode(request_type), request_id, body);
        let frame = message.to_value(&inner.constants)?;
        outbound
            .send(OutboundFrame::Json(frame))
            .map_err(|_| EyeXError::NotConnected)?;
        inner.pending.insert(request_id, responder);
        trace!(request_id, request_type = %request_type.name(), "Request sent");
        Ok(request_id)
    }

    /// Send a message in the protocol envelope
    pub fn send_message(&self, message: &Message) -> Result<()> {
        let inner = self.shared.inner.lock();
        let outbound = inner.outbound.as_ref().ok_or(EyeXError::NotConnected)?;
        let frame = message.to_value(&inner.constants)?;
        outbound
            .send(OutboundFrame::Json(frame))
            .map_err(|_| EyeXError::NotConnected)
    }

    /// Send a JSON value as is, bypassing the envelope
    pub fn send_raw(&self, value: Value) -> Result<()> {
        let inner = self.shared.inner.lock();
        let outbound = inner.outbound.as_ref().ok_or(EyeXError::NotConnected)?;
        outbound
            .send(OutboundFrame::Json(value))
            .map_err(|_| EyeXError::NotConnected)
    }

    fn emit(&self, event: CommunicatorEvent) {
        if self.shared.events.send(event).is_err() {
            trace!("Communicator event dropped; receiver is gone");
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        let inner = self.shared.inner.lock();
        inner.is_open && inner.generation == generation
    }

    async fn run(self, generation: u64) {
        let url = self.shared.config.url.clone();
        let mut retry = false;
        let mut attempt: u32 = 0;

        loop {
            if retry {
                sleep(self.reconnect_interval()).await;
            }
            retry = true;
            if !self.is_current(generation) {
                return;
            }

            attempt += 1;
            debug!(attempt, url = %url, "Connecting to engine");
            let TransportLink {
                outbound,
                mut inbound,
            } = match self.shared.transport.open(&url).await {
                Ok(link) => link,
                Err(e) => {
                    debug!(attempt, error = %e, "Connection attempt failed");
                    continue;
                }
            };
            if !self.on_connected(generation, outbound) {
                return;
            }
            attempt = 0;

            while let Some(TransportEvent::Message(frame)) = inbound.recv().await {
                self.on_frame(generation, frame);
            }

            if !self.on_disconnected(generation) {
                return;
            }
        }
    }

    fn on_connected(&self, generation: u64, outbound: mpsc::UnboundedSender<OutboundFrame>) -> bool {
        {
            let mut inner = self.shared.inner.lock();
            if !inner.is_open || inner.generation != generation {
                let _ = outbound.send(OutboundFrame::Close);
                return false;
            }
            inner.outbound = Some(outbound);
            inner.state = ConnectionState::Connected;
        }
        info!(url = %self.shared.config.url, "Connected to engine");
        self.emit(CommunicatorEvent::Connected);
        true
    }

    fn on_frame(&self, generation: u64, frame: Value) {
        let state = {
            let inner = self.shared.inner.lock();
            if inner.generation != generation {
                return;
            }
            inner.state
        };

        if state == ConnectionState::Connected {
            self.establish(generation, &frame);
            return;
        }

        let constants = self.constants();
        let message = match Message::from_value(frame, &constants) {
            Ok(message) => message,
            Err(e) => {
                warn!(error = %e, "Dropping malformed message");
                return;
            }
        };

        if message.message_type == MessageType::Response {
            self.resolve(message);
        } else {
            self.emit(CommunicatorEvent::Message(message));
        }
    }

    fn establish(&self, generation: u64, handshake: &Value) {
        let constants = match ProtocolConstants::from_handshake(handshake) {
            Ok(constants) => Arc::new(constants),
            Err(e) => {
                warn!(error = %e, "Handshake carried malformed constants; using defaults");
                Arc::new(ProtocolConstants::default())
            }
        };

        {
            let mut inner = self.shared.inner.lock();
            if inner.generation != generation {
                return;
            }
            inner.constants = Arc::clone(&constants);
            inner.state = ConnectionState::Established;
            if let Some(stale) = inner.time_sync_task.take() {
                stale.abort();
            }
            inner.time_sync_task = Some(tokio::spawn(self.clone().run_time_sync(generation)));
        }

        info!("Communication with engine established");
        self.emit(CommunicatorEvent::Established(constants));
    }

    fn resolve(&self, response: Message) {
        let Some(request_id) = response.request_id() else {
            warn!("Dropping response without request id");
            return;
        };
        let responder = self.shared.inner.lock().pending.remove(&request_id);
        match responder {
            Some(responder) => {
                let _ = responder.send(Ok(response.body));
            }
            None => trace!(request_id, "Dropping unmatched response"),
        }
    }

    fn on_disconnected(&self, generation: u64) -> bool {
        let (pending, time_sync) = {
            let mut inner = self.shared.inner.lock();
            if inner.generation != generation {
                return false;
            }
            inner.outbound = None;
            inner.state = ConnectionState::Connecting;
            (std::mem::take(&mut inner.pending), inner.time_sync_task.take())
        };

        if let Some(task) = time_sync {
            task.abort();
        }
        info!(
            retry_in_ms = self.reconnect_interval().as_millis() as u64,
            "Disconnected from engine"
        );
        self.emit(CommunicatorEvent::Disconnected);
        cancel_pending(pending, "connection lost");
        true
    }

    /// Delay before the next connection attempt
    fn reconnect_interval(&self) -> Duration {
        self.constants()
            .duration_setting(RECONNECT_INTERVAL_SETTING)
            .unwrap_or(self.shared.config.reconnect_interval)
    }

    async fn run_time_sync(self, generation: u64) {
        let interval = self
            .constants()
            .duration_setting(TIME_SYNC_INTERVAL_SETTING)
            .unwrap_or(self.shared.config.time_sync_interval);
        debug!(interval_ms = interval.as_millis() as u64, "Time sync running");
        loop {
            sleep(interval).await;
            if !self.is_current(generation) || !self.is_established() {
                return;
            }
            match self.send_request(WebRequestType::TimeSync, Value::Null).await {
                Ok(body) => match body.get("timeDiff").and_then(Value::as_f64) {
                    Some(time_diff) => {
                        self.shared.clock.set_time_diff(time_diff);
                        trace!(time_diff, "Clock synchronized with engine");
                    }
                    None => warn!("Time sync response without timeDiff"),
                },
                Err(e) => debug!(error = %e, "Time sync request failed"),
            }
        }
    }
}

fn cancel_pending(pending: PendingRequests, reason: &str) {
    if pending.is_empty() {
        return;
    }
    debug!(count = pending.len(), reason, "Cancelling pending requests");
    for (_, responder) in pending {
        let _ = responder.send(Err(EyeXError::cancelled(reason)));
    }
}

impl std::fmt::Debug for Communicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.shared.inner.lock();
        f.debug_struct("Communicator")
            .field("url", &self.shared.config.url)
            .field("state", &inner.state)
            .field("pending", &inner.pending.len())
            .finish()
    }
}
