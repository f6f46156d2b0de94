//! Session context
//!
//! The [`Context`] is the one object applications and sub-systems share for
//! a session. It owns the communicator, decodes every inbound message once
//! and fans it out to the handlers registered for its type, keeps the
//! per-path state observer reference counts, and builds the commands the
//! engine understands (snapshot commits, state reads and writes,
//! visibility).
//!
//! Communicator events are consumed by a single dispatch task, so handlers
//! see messages in arrival order and never run concurrently with each
//! other. Handlers are invoked outside every internal lock and a panicking
//! handler does not stop its siblings.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use eyex_core::{
    invoke_isolated, Command, CommandType, CoordinateConverter, CoordinatesFacade, EyeXError,
    Event, IdentityConverter, Message, MessageType, Notification, NotificationType,
    ProtocolConstants, ProtocolEnum, Query, RequestType, Result, ServerClock, Snapshot, StateBag,
    WebRequestType,
};
use eyex_transport::{Communicator, CommunicatorEvent, ResponseFuture, Transport};
use futures::future::BoxFuture;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::config::ClientConfig;

/// Handle returned when registering a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerTicket(u64);

/// A decoded inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// The engine asks for interactors
    Query(Query),
    /// Something happened to an interactor
    Event(Event),
    /// State or connectivity information
    Notification(Notification),
}

impl InboundMessage {
    /// Message type the handlers are keyed by
    pub fn message_type(&self) -> MessageType {
        match self {
            InboundMessage::Query(_) => MessageType::Query,
            InboundMessage::Event(_) => MessageType::Event,
            InboundMessage::Notification(_) => MessageType::Notification,
        }
    }
}

type MessageHandler = Arc<dyn Fn(&InboundMessage) + Send + Sync>;
type ConnectionHandler = Arc<dyn Fn(bool) + Send + Sync>;

struct HandlerEntry {
    ticket: HandlerTicket,
    handler: MessageHandler,
    /// Set for state-changed handlers so unregistering can release the observer
    state_path: Option<String>,
}

#[derive(Default)]
struct Registry {
    next_ticket: u64,
    message_handlers: IndexMap<MessageType, Vec<HandlerEntry>>,
    connection_handlers: Vec<(HandlerTicket, ConnectionHandler)>,
    state_observations: HashMap<String, usize>,
}

impl Registry {
    fn ticket(&mut self) -> HandlerTicket {
        self.next_ticket += 1;
        HandlerTicket(self.next_ticket)
    }
}

/// One interaction session with the engine.
pub struct Context {
    config: ClientConfig,
    communicator: Communicator,
    coords: Arc<CoordinatesFacade>,
    next_unique_id: AtomicU64,
    registry: Mutex<Registry>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl Context {
    /// Create a context whose client space is the screen.
    ///
    /// Must be called from within a tokio runtime. The connection stays
    /// closed until [`enable_connection`](Self::enable_connection).
    pub fn new(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Arc<Self>> {
        let converter = Arc::new(IdentityConverter::new(config.virtual_bounds));
        Self::with_converter(config, transport, converter)
    }

    /// Create a context with a host-supplied coordinate converter
    pub fn with_converter(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        converter: Arc<dyn CoordinateConverter>,
    ) -> Result<Arc<Self>> {
        config.validate()?;
        let (communicator, events) = Communicator::new(
            config.communicator_config(),
            transport,
            Arc::new(ServerClock::new()),
        );
        let context = Arc::new(Self {
            config,
            communicator,
            coords: Arc::new(CoordinatesFacade::new(converter)),
            next_unique_id: AtomicU64::new(0),
            registry: Mutex::new(Registry::default()),
            dispatcher: Mutex::new(None),
        });
        let dispatcher = tokio::spawn(dispatch(Arc::downgrade(&context), events));
        *context.dispatcher.lock() = Some(dispatcher);
        Ok(context)
    }

    /// Start connecting to the engine
    pub fn enable_connection(&self) {
        self.communicator.open();
    }

    /// Close the engine connection and stop reconnecting
    pub fn disable_connection(&self) {
        self.communicator.close();
    }

    /// Configuration the context was created with
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The engine connection
    pub fn communicator(&self) -> &Communicator {
        &self.communicator
    }

    /// Coordinate conversion for this session
    pub fn coords(&self) -> &Arc<CoordinatesFacade> {
        &self.coords
    }

    /// Constants in force
    pub fn constants(&self) -> Arc<ProtocolConstants> {
        self.communicator.constants()
    }

    /// Whether the handshake has completed on the current connection
    pub fn is_established(&self) -> bool {
        self.communicator.is_established()
    }

    /// Session-unique number, starting at 1
    pub fn next_unique_id(&self) -> u64 {
        self.next_unique_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    // ------------------------------------------------------------------
    // Commands and snapshots
    // ------------------------------------------------------------------

    /// Create a command
    pub fn create_command(&self, command_type: CommandType, data: Value) -> Command {
        Command::new(command_type, data)
    }

    /// Send a command; the future resolves with the engine's answer
    pub fn execute_async(&self, command: &Command) -> ResponseFuture {
        let contract = command.to_contract(&self.constants());
        match serde_json::to_value(contract) {
            Ok(body) => self.communicator.send_request(RequestType::Command, body),
            Err(e) => rejected(e.into()),
        }
    }

    /// Create an empty snapshot
    pub fn create_snapshot(&self) -> Snapshot {
        Snapshot::new()
    }

    /// Create an empty snapshot covering the region and windows of `query`
    pub fn create_snapshot_for_query(&self, query: &Query) -> Snapshot {
        Snapshot::for_query(query)
    }

    /// Commit a snapshot, stamped with the synchronized engine time
    pub fn commit_snapshot(&self, snapshot: &Snapshot) -> ResponseFuture {
        let constants = self.constants();
        let timestamp = self.communicator.clock().now();
        let data = snapshot
            .to_contract(&constants, timestamp)
            .and_then(|contract| serde_json::to_value(contract).map_err(EyeXError::from));
        match data {
            Ok(data) => {
                trace!(interactors = snapshot.len(), timestamp, "Committing snapshot");
                self.execute_async(&Command::new(CommandType::CommitSnapshot, data))
            }
            Err(e) => rejected(e),
        }
    }

    /// Tell the engine whether the hosting page is visible.
    ///
    /// Invisible clients receive no events.
    pub fn set_visibility(&self, is_visible: bool) -> ResponseFuture {
        debug!(is_visible, "Setting visibility");
        self.communicator
            .send_request(WebRequestType::SetVisibility, json!({ "isVisible": is_visible }))
    }

    // ------------------------------------------------------------------
    // State access
    // ------------------------------------------------------------------

    /// Read the state at `state_path`
    pub fn get_state_async(&self, state_path: &str) -> BoxFuture<'static, Result<StateBag>> {
        let response = self.execute_async(&Command::new(
            CommandType::GetState,
            json!({ "statePath": state_path }),
        ));
        let communicator = self.communicator.clone();
        Box::pin(async move {
            let data = ok_data(&communicator, response.await?)?;
            Ok(serde_json::from_value(data)?)
        })
    }

    /// Write a state bag
    pub fn set_state_async(&self, state_bag: &StateBag) -> BoxFuture<'static, Result<()>> {
        let data = match serde_json::to_value(state_bag) {
            Ok(data) => data,
            Err(e) => return Box::pin(futures::future::ready(Err(e.into()))),
        };
        let response = self.execute_async(&Command::new(CommandType::SetState, data));
        let communicator = self.communicator.clone();
        Box::pin(async move {
            ok_data(&communicator, response.await?)?;
            Ok(())
        })
    }

    /// Create a state bag
    pub fn create_state_bag(&self, state_path: impl Into<String>, data: Value) -> StateBag {
        StateBag::new(state_path, data)
    }

    /// Call `callback` with every state change that affects `state_path`.
    ///
    /// A change affects the path when the path starts with the changed
    /// state's path, so changes to a parent are delivered as well. The
    /// engine is asked to observe the path when the first handler for it
    /// registers.
    pub fn register_state_changed_handler(
        &self,
        state_path: impl Into<String>,
        callback: impl Fn(&StateBag) + Send + Sync + 'static,
    ) -> HandlerTicket {
        let state_path = state_path.into();
        let first = {
            let mut registry = self.registry.lock();
            let count = registry
                .state_observations
                .entry(state_path.clone())
                .or_insert(0);
            *count += 1;
            *count == 1
        };
        if first {
            self.send_observer_command(CommandType::RegisterStateObserver, &state_path);
        }

        let subscribed = state_path.clone();
        let handler: MessageHandler = Arc::new(move |message| {
            let InboundMessage::Notification(notification) = message else {
                return;
            };
            if notification.notification_type != Some(NotificationType::StateChanged) {
                return;
            }
            let bag: StateBag = match serde_json::from_value(notification.data.clone()) {
                Ok(bag) => bag,
                Err(e) => {
                    warn!(error = %e, "Dropping malformed state-changed notification");
                    return;
                }
            };
            if bag.affects(&subscribed) {
                callback(&bag);
            }
        });
        self.insert_message_handler(MessageType::Notification, handler, Some(state_path))
    }

    /// Remove a state-changed handler; returns whether it was registered
    pub fn unregister_state_changed_handler(&self, ticket: HandlerTicket) -> bool {
        let released = {
            let mut registry = self.registry.lock();
            let Some(entry) = remove_entry(&mut registry.message_handlers, ticket) else {
                return false;
            };
            let Some(state_path) = entry.state_path else {
                return true;
            };
            match registry.state_observations.get_mut(&state_path) {
                Some(count) if *count > 1 => {
                    *count -= 1;
                    None
                }
                Some(_) => {
                    registry.state_observations.remove(&state_path);
                    Some(state_path)
                }
                None => None,
            }
        };
        if let Some(state_path) = released {
            self.send_observer_command(CommandType::UnregisterStateObserver, &state_path);
        }
        true
    }

    /// Number of handlers observing `state_path`
    pub fn state_observer_count(&self, state_path: &str) -> usize {
        self.registry
            .lock()
            .state_observations
            .get(state_path)
            .copied()
            .unwrap_or(0)
    }

    fn send_observer_command(&self, command_type: CommandType, state_path: &str) {
        debug!(state_path, command = %command_type, "Updating state observation");
        // Fire and forget: the request is queued before the future is dropped
        drop(self.execute_async(&Command::new(
            command_type,
            json!({ "statePath": state_path }),
        )));
    }

    // ------------------------------------------------------------------
    // Handler registry
    // ------------------------------------------------------------------

    /// Register a handler for every inbound message of `message_type`.
    ///
    /// Handlers of one type run in registration order.
    pub fn register_message_handler(
        &self,
        message_type: MessageType,
        handler: impl Fn(&InboundMessage) + Send + Sync + 'static,
    ) -> HandlerTicket {
        self.insert_message_handler(message_type, Arc::new(handler), None)
    }

    /// Register a query handler
    pub fn register_query_handler(
        &self,
        handler: impl Fn(&Query) + Send + Sync + 'static,
    ) -> HandlerTicket {
        self.register_message_handler(MessageType::Query, move |message| {
            if let InboundMessage::Query(query) = message {
                handler(query);
            }
        })
    }

    /// Register an event handler
    pub fn register_event_handler(
        &self,
        handler: impl Fn(&Event) + Send + Sync + 'static,
    ) -> HandlerTicket {
        self.register_message_handler(MessageType::Event, move |message| {
            if let InboundMessage::Event(event) = message {
                handler(event);
            }
        })
    }

    /// Register a notification handler
    pub fn register_notification_handler(
        &self,
        handler: impl Fn(&Notification) + Send + Sync + 'static,
    ) -> HandlerTicket {
        self.register_message_handler(MessageType::Notification, move |message| {
            if let InboundMessage::Notification(notification) = message {
                handler(notification);
            }
        })
    }

    /// Remove a message handler of any type; returns whether it was registered
    pub fn unregister_message_handler(&self, ticket: HandlerTicket) -> bool {
        let entry = remove_entry(&mut self.registry.lock().message_handlers, ticket);
        entry.is_some()
    }

    /// Number of handlers registered for `message_type`
    pub fn message_handler_count(&self, message_type: MessageType) -> usize {
        self.registry
            .lock()
            .message_handlers
            .get(&message_type)
            .map_or(0, Vec::len)
    }

    fn insert_message_handler(
        &self,
        message_type: MessageType,
        handler: MessageHandler,
        state_path: Option<String>,
    ) -> HandlerTicket {
        let mut registry = self.registry.lock();
        let ticket = registry.ticket();
        registry
            .message_handlers
            .entry(message_type)
            .or_default()
            .push(HandlerEntry {
                ticket,
                handler,
                state_path,
            });
        ticket
    }

    /// Call `handler` with `true` once communication is established and
    /// with `false` whenever the connection is lost
    pub fn register_connection_state_changed_handler(
        &self,
        handler: impl Fn(bool) + Send + Sync + 'static,
    ) -> HandlerTicket {
        let mut registry = self.registry.lock();
        let ticket = registry.ticket();
        registry.connection_handlers.push((ticket, Arc::new(handler)));
        ticket
    }

    /// Remove a connection state handler; returns whether it was registered
    pub fn unregister_connection_state_changed_handler(&self, ticket: HandlerTicket) -> bool {
        let mut registry = self.registry.lock();
        let before = registry.connection_handlers.len();
        registry.connection_handlers.retain(|(t, _)| *t != ticket);
        registry.connection_handlers.len() != before
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Process one communicator event.
    ///
    /// The dispatch task calls this for every event in order.
    pub fn handle_communicator_event(&self, event: CommunicatorEvent) {
        match event {
            CommunicatorEvent::Connected => self.send_slave_message(),
            CommunicatorEvent::Established(_) => self.call_connection_handlers(true),
            CommunicatorEvent::Disconnected => self.call_connection_handlers(false),
            CommunicatorEvent::Message(message) => self.on_message(message),
        }
    }

    fn send_slave_message(&self) {
        debug!(slave_id = ?self.config.slave_id, "Sending slave message");
        let payload = json!({
            "mode": "slave",
            "masterId": self.config.master_id,
            "slaveId": self.config.slave_id,
            "token": self.config.token,
        });
        if let Err(e) = self.communicator.send_raw(payload) {
            debug!(error = %e, "Slave message not sent");
        }
    }

    fn on_message(&self, message: Message) {
        let constants = self.constants();
        let decoded = match message.message_type {
            MessageType::Query => Query::from_body(&message.body, &constants).map(InboundMessage::Query),
            MessageType::Event => Event::from_body(&message.body, &constants).map(InboundMessage::Event),
            MessageType::Notification => {
                Notification::from_body(&message.body, &constants).map(InboundMessage::Notification)
            }
            MessageType::Request | MessageType::Response => {
                trace!(message_type = %message.message_type, "Ignoring message");
                return;
            }
        };
        match decoded {
            Ok(inbound) => self.call_message_handlers(&inbound),
            Err(e) => warn!(
                message_type = %message.message_type,
                error = %e,
                "Dropping message that does not follow the contract"
            ),
        }
    }

    fn call_message_handlers(&self, message: &InboundMessage) {
        let message_type = message.message_type();
        let handlers: Vec<MessageHandler> = self
            .registry
            .lock()
            .message_handlers
            .get(&message_type)
            .map(|entries| entries.iter().map(|e| Arc::clone(&e.handler)).collect())
            .unwrap_or_default();
        trace!(message_type = %message_type, handlers = handlers.len(), "Dispatching message");
        for handler in handlers {
            invoke_isolated(message_type.name(), || handler(message));
        }
    }

    fn call_connection_handlers(&self, is_connected: bool) {
        info!(is_connected, "Connection state changed");
        let handlers: Vec<ConnectionHandler> = self
            .registry
            .lock()
            .connection_handlers
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for handler in handlers {
            invoke_isolated("connection state handler", || handler(is_connected));
        }
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.communicator.close();
        if let Some(dispatcher) = self.dispatcher.get_mut().take() {
            dispatcher.abort();
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("communicator", &self.communicator)
            .finish_non_exhaustive()
    }
}

async fn dispatch(context: Weak<Context>, mut events: mpsc::UnboundedReceiver<CommunicatorEvent>) {
    while let Some(event) = events.recv().await {
        let Some(context) = context.upgrade() else {
            break;
        };
        context.handle_communicator_event(event);
    }
    trace!("Context dispatch finished");
}

fn remove_entry(
    handlers: &mut IndexMap<MessageType, Vec<HandlerEntry>>,
    ticket: HandlerTicket,
) -> Option<HandlerEntry> {
    handlers.values_mut().find_map(|entries| {
        let index = entries.iter().position(|e| e.ticket == ticket)?;
        Some(entries.remove(index))
    })
}

fn ok_data(communicator: &Communicator, body: Value) -> Result<Value> {
    let result = body.get("result").cloned().unwrap_or(Value::Null);
    if !communicator.constants().is_ok_result(&result) {
        debug!(result = %result, "Command answered with a failure code");
        return Err(EyeXError::RequestFailed);
    }
    Ok(body.get("data").cloned().unwrap_or(Value::Null))
}

fn rejected(error: EyeXError) -> ResponseFuture {
    Box::pin(futures::future::ready(Err(error)))
}
