//! EyeX Core - protocol foundation for the EyeX web binding
//!
//! This crate holds everything the client runtime shares between the
//! transport and the interactor layers, with no I/O of its own:
//!
//! - [`errors`]: the single error type and `Result` alias
//! - [`constants`]: server-driven protocol constants and the typed enums they encode
//! - [`geometry`]: rectangles with edge-inclusive overlap and containment
//! - [`coords`]: screen/client coordinate conversion behind a swappable facade
//! - [`signal`]: ticketed, panic-isolated notification lists
//! - [`clock`]: the server-synchronized clock used for snapshot timestamps
//! - [`model`]: the wire model (messages, commands, snapshots, interactors, ...)

#![forbid(unsafe_code)]

/// Unified error handling
pub mod errors;

/// Protocol constant tables and typed protocol enums
pub mod constants;

/// Rectangles and overlap tests
pub mod geometry;

/// Screen/client coordinate conversion
pub mod coords;

/// Ticketed subscriber lists
pub mod signal;

/// Server-synchronized clock
pub mod clock;

/// Panic isolation for application callbacks
pub mod callbacks;

/// Wire protocol model
pub mod model;

pub use callbacks::invoke_isolated;
pub use clock::ServerClock;
pub use constants::{
    ActivatableEventType, BehaviorType, BoundsType, CommandType, FixationDataMode,
    GazeAwareMode, GazePointDataMode, MessageType, NotificationType, PanDirection,
    PannableEventType, PanningProfile, ProtocolConstants, ProtocolEnum, RequestType, ResultCode,
    WebRequestType,
};
pub use coords::{
    CoordinateConverter, CoordinatesFacade, IdentityConverter, ViewportChange, ViewportConverter,
    ViewportMetrics,
};
pub use errors::{EyeXError, Result};
pub use geometry::Rect;
pub use model::{
    Behavior, BehaviorData, Bounds, Command, Event, Interactor, Mask, Message, Metadata,
    Notification, Query, Snapshot, StateBag, WindowId,
};
pub use signal::{Signal, SubscriptionTicket};
