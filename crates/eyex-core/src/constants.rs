//! Protocol constants
//!
//! Every enum-valued field on the wire (message types, command types,
//! behavior types, ...) is looked up in a table the engine may send as part
//! of the handshake. [`ProtocolConstants`] is an immutable value built from
//! that payload; a new handshake produces a new value that replaces the old
//! one as a whole. Without a server table every enum encodes to its
//! canonical camelCase name.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::errors::{EyeXError, Result};

/// Default engine endpoint
pub const DEFAULT_WEBSOCKET_URL: &str = "ws://127.0.0.1:44049";

/// Default delay between reconnect attempts, in milliseconds
pub const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 2_000;

/// Default delay between time-sync requests, in milliseconds
pub const DEFAULT_TIME_SYNC_INTERVAL_MS: u64 = 10_000;

/// Handshake setting overriding the reconnect delay, in milliseconds
pub const RECONNECT_INTERVAL_SETTING: &str = "reconnectIntervalMs";

/// Handshake setting overriding the time-sync period, in milliseconds
pub const TIME_SYNC_INTERVAL_SETTING: &str = "timeSyncIntervalMs";

/// Literal naming the root of every interactor tree
pub const ROOT_ID_LITERAL: &str = "rootId";

/// Literal naming the window of global (bounds-less) interactors
pub const GLOBAL_INTERACTOR_WINDOW_ID_LITERAL: &str = "globalInteractorWindowId";

/// A closed set of values that is encoded through a constant table.
pub trait ProtocolEnum: Copy + Eq + std::hash::Hash + std::fmt::Debug + Send + Sync + 'static {
    /// Name of the constant table holding the wire values
    const TABLE: &'static str;

    /// Every variant, in declaration order
    const ALL: &'static [Self];

    /// Canonical name of the variant inside its table
    fn name(self) -> &'static str;
}

macro_rules! protocol_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident in $table:literal {
            $($(#[$vmeta:meta])* $variant:ident => $wire:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        $vis enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl ProtocolEnum for $name {
            const TABLE: &'static str = $table;
            const ALL: &'static [Self] = &[$(Self::$variant),+];

            fn name(self) -> &'static str {
                match self {
                    $(Self::$variant => $wire),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.name())
            }
        }
    };
}

protocol_enum! {
    /// Envelope message type
    pub enum MessageType in "messageType" {
        /// Engine asks for the interactors inside a region
        Query => "query",
        /// Engine reports something that happened to an interactor
        Event => "event",
        /// Engine pushes state or connectivity information
        Notification => "notification",
        /// Client to engine request
        Request => "request",
        /// Engine answer to a request
        Response => "response",
    }
}

protocol_enum! {
    /// Request type carried in request metadata
    pub enum RequestType in "requestType" {
        /// A command (`{commandType, data}` body)
        Command => "command",
        /// Application defined request
        Custom => "custom",
    }
}

protocol_enum! {
    /// Transport-level requests used by the page host
    pub enum WebRequestType in "webRequestType" {
        /// Register slave pages with a master
        RegisterSlaves => "registerSlaves",
        /// Unregister slave pages
        UnregisterSlaves => "unregisterSlaves",
        /// Update the set of active slaves
        UpdateActiveSlaves => "updateActiveSlaves",
        /// Tell the engine the browser name
        SetBrowserName => "setBrowserName",
        /// Page visibility changed
        SetVisibility => "setVisibility",
        /// Clock offset request
        TimeSync => "timeSync",
    }
}

protocol_enum! {
    /// Command type of a command body
    pub enum CommandType in "commandType" {
        /// Submit a snapshot answering a query
        CommitSnapshot => "commitSnapshot",
        /// Read a state path
        GetState => "getState",
        /// Write a state bag
        SetState => "setState",
        /// Start receiving state-changed notifications for a path
        RegisterStateObserver => "registerStateObserver",
        /// Stop receiving state-changed notifications for a path
        UnregisterStateObserver => "unregisterStateObserver",
    }
}

protocol_enum! {
    /// Notification type of a notification body
    pub enum NotificationType in "notificationType" {
        /// An observed state path changed
        StateChanged => "stateChanged",
    }
}

protocol_enum! {
    /// Result code of an asynchronous command answer
    pub enum ResultCode in "resultCode" {
        /// Success
        Ok => "ok",
        /// Any engine-side failure
        Error => "error",
    }
}

protocol_enum! {
    /// Behavior attached to an interactor
    pub enum BehaviorType in "behaviorType" {
        /// Can be activated and receive activation focus
        Activatable => "activatable",
        /// Can be panned
        Pannable => "pannable",
        /// Reports gaze enter and leave
        GazeAware => "gazeAware",
        /// Streams gaze points
        GazePointData => "gazePointData",
        /// Streams fixations
        FixationData => "fixationData",
        /// Streams eye positions
        EyePositionData => "eyePositionData",
    }
}

protocol_enum! {
    /// Shape of a bounds value
    pub enum BoundsType in "boundsType" {
        /// No bounds (global interactors)
        None => "none",
        /// Axis aligned rectangle
        Rectangular => "rectangular",
    }
}

protocol_enum! {
    /// Kind of an activatable event
    pub enum ActivatableEventType in "activatableEventType" {
        /// Activation focus moved onto or off the interactor
        ActivationFocusChanged => "activationFocusChanged",
        /// The interactor was activated
        Activated => "activated",
    }
}

protocol_enum! {
    /// Kind of a pannable event
    pub enum PannableEventType in "pannableEventType" {
        /// Continuous pan velocity
        Pan => "pan",
        /// Discrete pan step
        Step => "step",
        /// Hands-free panning toggled
        HandsFree => "handsFree",
    }
}

protocol_enum! {
    /// Panning profile of a pannable interactor
    pub enum PanningProfile in "panningProfile" {
        /// No profile
        None => "none",
        /// Reading-oriented panning
        Reading => "reading",
        /// Horizontal only
        Horizontal => "horizontal",
        /// Vertical only
        Vertical => "vertical",
        /// Any direction
        Radial => "radial",
    }
}

protocol_enum! {
    /// Directions a pannable interactor accepts
    pub enum PanDirection in "panDirection" {
        /// No direction
        None => "none",
        /// Left
        Left => "left",
        /// Right
        Right => "right",
        /// Up
        Up => "up",
        /// Down
        Down => "down",
        /// Every direction
        All => "all",
    }
}

protocol_enum! {
    /// Gaze-aware reporting mode
    pub enum GazeAwareMode in "gazeAwareMode" {
        /// Report immediately
        Normal => "normal",
        /// Report after the configured delay
        Delayed => "delayed",
    }
}

protocol_enum! {
    /// Filtering of streamed gaze points
    pub enum GazePointDataMode in "gazePointDataMode" {
        /// Raw samples
        Unfiltered => "unfiltered",
        /// Lightly smoothed samples
        LightlyFiltered => "lightlyFiltered",
    }
}

protocol_enum! {
    /// Sensitivity of streamed fixations
    pub enum FixationDataMode in "fixationDataMode" {
        /// Detect short fixations
        Sensitive => "sensitive",
        /// Detect only stable fixations
        Slow => "slow",
    }
}

/// Constant tables negotiated with the engine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProtocolConstants {
    tables: BTreeMap<String, BTreeMap<String, Value>>,
    literals: BTreeMap<String, Value>,
    settings: BTreeMap<String, Value>,
}

impl ProtocolConstants {
    /// Build constants from the first message of a connection.
    ///
    /// The payload's `constants` object is layered over the defaults:
    /// object entries become tables, the three literal tables merge into one,
    /// scalar entries become settings. A payload without `constants` yields
    /// the defaults.
    pub fn from_handshake(payload: &Value) -> Result<Self> {
        let mut constants = Self::default();
        match payload.get("constants") {
            None | Some(Value::Null) => Ok(constants),
            Some(Value::Object(entries)) => {
                constants.merge(entries);
                Ok(constants)
            }
            Some(other) => Err(EyeXError::protocol(format!(
                "handshake constants must be an object, got {other}"
            ))),
        }
    }

    fn merge(&mut self, entries: &Map<String, Value>) {
        for (key, value) in entries {
            match (key.as_str(), value) {
                ("literals" | "sharedLiterals" | "internalLiterals", Value::Object(literals)) => {
                    self.literals
                        .extend(literals.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                (_, Value::Object(table)) => {
                    self.tables
                        .entry(key.clone())
                        .or_default()
                        .extend(table.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                _ => {
                    self.settings.insert(key.clone(), value.clone());
                }
            }
        }
    }

    /// Wire value of an enum variant
    pub fn encode<E: ProtocolEnum>(&self, value: E) -> Value {
        self.tables
            .get(E::TABLE)
            .and_then(|table| table.get(value.name()))
            .cloned()
            .unwrap_or_else(|| Value::String(value.name().to_string()))
    }

    /// Enum variant of a wire value, if any variant encodes to it
    pub fn decode<E: ProtocolEnum>(&self, wire: &Value) -> Option<E> {
        E::ALL.iter().copied().find(|v| self.encode(*v) == *wire)
    }

    /// Like [`decode`](Self::decode), failing with a protocol error
    pub fn decode_required<E: ProtocolEnum>(&self, wire: &Value) -> Result<E> {
        self.decode(wire).ok_or_else(|| {
            EyeXError::protocol(format!("unknown {} value: {wire}", E::TABLE))
        })
    }

    /// Value of a literal, falling back to a built-in default
    pub fn literal(&self, name: &str) -> Value {
        self.literals
            .get(name)
            .cloned()
            .unwrap_or_else(|| default_literal(name))
    }

    /// Name of the literal whose value is `value`
    pub fn literal_name(&self, value: &Value) -> Option<&str> {
        if let Some((name, _)) = self.literals.iter().find(|(_, v)| *v == value) {
            return Some(name.as_str());
        }
        [ROOT_ID_LITERAL, GLOBAL_INTERACTOR_WINDOW_ID_LITERAL]
            .into_iter()
            .find(|name| default_literal(name) == *value)
    }

    /// Scalar setting sent by the engine
    pub fn setting(&self, name: &str) -> Option<&Value> {
        self.settings.get(name)
    }

    /// Setting holding a positive number of milliseconds
    pub fn duration_setting(&self, name: &str) -> Option<Duration> {
        self.setting(name)
            .and_then(Value::as_u64)
            .filter(|ms| *ms > 0)
            .map(Duration::from_millis)
    }

    /// Whether `result` is the ok result code
    pub fn is_ok_result(&self, result: &Value) -> bool {
        self.encode(ResultCode::Ok) == *result
    }
}

fn default_literal(name: &str) -> Value {
    match name {
        ROOT_ID_LITERAL => Value::String("root".to_string()),
        GLOBAL_INTERACTOR_WINDOW_ID_LITERAL => Value::String("global".to_string()),
        other => Value::String(other.to_string()),
    }
}
