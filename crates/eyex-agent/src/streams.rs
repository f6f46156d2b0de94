//! Streaming data
//!
//! Gaze points, fixations and eye positions are delivered through global
//! interactors: an interactor with no bounds in the global window, carrying
//! the data behavior. Enabling a stream commits that interactor, disabling
//! it commits the interactor again marked deleted. The engine forgets
//! interactors when the connection drops, so an enabled stream re-commits
//! itself every time communication is established.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use eyex_core::constants::GLOBAL_INTERACTOR_WINDOW_ID_LITERAL;
use eyex_core::{
    BehaviorData, BehaviorType, Bounds, FixationDataMode, GazePointDataMode, ProtocolEnum,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::{debug, trace};

use crate::context::{Context, HandlerTicket};

/// Receiver of streamed behavior data
pub type DataCallback = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Default)]
struct ProviderState {
    is_enabled: bool,
    event_ticket: Option<HandlerTicket>,
    connection_ticket: Option<HandlerTicket>,
}

/// One global interactor streaming one kind of data.
pub struct StreamingDataProvider {
    context: Arc<Context>,
    interactor_id: String,
    behavior_type: BehaviorType,
    behavior_data: BehaviorData,
    callback: DataCallback,
    state: Mutex<ProviderState>,
}

impl StreamingDataProvider {
    /// Create a disabled provider
    pub fn new(
        context: Arc<Context>,
        behavior_type: BehaviorType,
        behavior_data: BehaviorData,
        callback: DataCallback,
    ) -> Arc<Self> {
        let interactor_id = format!("streaming_{}", context.next_unique_id());
        Arc::new(Self {
            context,
            interactor_id,
            behavior_type,
            behavior_data,
            callback,
            state: Mutex::new(ProviderState::default()),
        })
    }

    /// Id of the global interactor
    pub fn interactor_id(&self) -> &str {
        &self.interactor_id
    }

    /// Whether the stream is on
    pub fn is_enabled(&self) -> bool {
        self.state.lock().is_enabled
    }

    /// Turn the stream on or off; does nothing if already in that state
    pub fn enable(self: &Arc<Self>, is_enabled: bool) {
        {
            let mut state = self.state.lock();
            if state.is_enabled == is_enabled {
                return;
            }
            state.is_enabled = is_enabled;
        }
        if is_enabled {
            self.on_enabled();
        } else {
            self.on_disabled();
        }
    }

    fn on_enabled(self: &Arc<Self>) {
        self.send_snapshot(false);

        let weak: Weak<Self> = Arc::downgrade(self);
        let event_ticket = self.context.register_event_handler(move |event| {
            let Some(provider) = weak.upgrade() else {
                return;
            };
            if event.interactor_id != provider.interactor_id {
                return;
            }
            if let Some(behavior) = event.behavior(provider.behavior_type) {
                let data = behavior.data.as_raw().cloned().unwrap_or(Value::Null);
                (provider.callback)(&data);
            }
        });

        let weak: Weak<Self> = Arc::downgrade(self);
        let connection_ticket = self
            .context
            .register_connection_state_changed_handler(move |is_connected| {
                if !is_connected {
                    return;
                }
                if let Some(provider) = weak.upgrade() {
                    let is_enabled = provider.is_enabled();
                    provider.send_snapshot(!is_enabled);
                }
            });

        let mut state = self.state.lock();
        state.event_ticket = Some(event_ticket);
        state.connection_ticket = Some(connection_ticket);
        debug!(interactor_id = %self.interactor_id, behavior = %self.behavior_type, "Stream enabled");
    }

    fn on_disabled(&self) {
        let (event_ticket, connection_ticket) = {
            let mut state = self.state.lock();
            (state.event_ticket.take(), state.connection_ticket.take())
        };
        if let Some(ticket) = connection_ticket {
            self.context.unregister_connection_state_changed_handler(ticket);
        }
        if let Some(ticket) = event_ticket {
            self.context.unregister_message_handler(ticket);
        }
        self.send_snapshot(true);
        debug!(interactor_id = %self.interactor_id, behavior = %self.behavior_type, "Stream disabled");
    }

    fn send_snapshot(&self, is_deleted: bool) {
        let global_window = self
            .context
            .constants()
            .literal(GLOBAL_INTERACTOR_WINDOW_ID_LITERAL);

        let mut snapshot = self.context.create_snapshot();
        snapshot.set_window_ids(vec![global_window.clone()]);
        snapshot.set_bounds(Bounds::None);
        let interactor = snapshot.create_interactor(self.interactor_id.clone());
        interactor.is_deleted = is_deleted;
        interactor.bounds = Bounds::None;
        interactor.set_behavior(self.behavior_type, self.behavior_data.clone());
        interactor.window_id = Some(global_window);

        trace!(interactor_id = %self.interactor_id, is_deleted, "Committing stream interactor");
        let commit = self.context.commit_snapshot(&snapshot);
        tokio::spawn(async move {
            if let Err(e) = commit.await {
                debug!(error = %e, "Stream snapshot commit failed");
            }
        });
    }
}

impl std::fmt::Debug for StreamingDataProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingDataProvider")
            .field("interactor_id", &self.interactor_id)
            .field("behavior_type", &self.behavior_type)
            .field("is_enabled", &self.is_enabled())
            .finish()
    }
}

/// Starts and stops data streams, at most one per data kind and mode.
#[derive(Debug)]
pub struct StreamHelper {
    context: Arc<Context>,
    providers: Mutex<HashMap<(BehaviorType, String), Arc<StreamingDataProvider>>>,
}

impl StreamHelper {
    /// Create a helper for `context`
    pub fn new(context: Arc<Context>) -> Self {
        Self {
            context,
            providers: Mutex::new(HashMap::new()),
        }
    }

    /// Stream gaze points, lightly filtered by default; `None` stops the stream
    pub fn gaze_point_data(&self, mode: Option<GazePointDataMode>, callback: Option<DataCallback>) {
        let mode = mode.unwrap_or(GazePointDataMode::LightlyFiltered);
        self.on_streaming_data(
            BehaviorType::GazePointData,
            mode.name(),
            BehaviorData::GazePointData {
                gaze_point_data_mode: mode,
            },
            callback,
        );
    }

    /// Stream fixations, sensitive by default; `None` stops the stream
    pub fn fixation_data(&self, mode: Option<FixationDataMode>, callback: Option<DataCallback>) {
        let mode = mode.unwrap_or(FixationDataMode::Sensitive);
        self.on_streaming_data(
            BehaviorType::FixationData,
            mode.name(),
            BehaviorData::FixationData {
                fixation_data_mode: mode,
            },
            callback,
        );
    }

    /// Stream eye positions; `None` stops the stream
    pub fn eye_position_data(&self, callback: Option<DataCallback>) {
        self.on_streaming_data(
            BehaviorType::EyePositionData,
            "default",
            BehaviorData::Raw(json!({})),
            callback,
        );
    }

    /// Number of running streams
    pub fn active_streams(&self) -> usize {
        self.providers.lock().len()
    }

    /// Provider of a running stream
    pub fn provider(&self, behavior_type: BehaviorType, mode: &str) -> Option<Arc<StreamingDataProvider>> {
        self.providers
            .lock()
            .get(&(behavior_type, mode.to_string()))
            .cloned()
    }

    fn on_streaming_data(
        &self,
        behavior_type: BehaviorType,
        mode: &str,
        behavior_data: BehaviorData,
        callback: Option<DataCallback>,
    ) {
        let key = (behavior_type, mode.to_string());
        let previous = self.providers.lock().remove(&key);
        if let Some(previous) = previous {
            previous.enable(false);
        }
        let Some(callback) = callback else {
            return;
        };

        let provider = StreamingDataProvider::new(
            Arc::clone(&self.context),
            behavior_type,
            behavior_data,
            callback,
        );
        provider.enable(true);
        self.providers.lock().insert(key, provider);
    }
}
