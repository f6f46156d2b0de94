//! Wire protocol model.
//!
//! Each type has a typed form used by the runtime and a `*Contract` form
//! that serializes exactly as the engine expects. Enum-valued fields are
//! translated between the two through [`ProtocolConstants`](crate::ProtocolConstants).

mod behavior;
mod bounds;
mod command;
mod event;
mod interactor;
mod mask;
mod message;
mod notification;
mod query;
mod snapshot;
mod state_bag;

pub use behavior::{Behavior, BehaviorContract, BehaviorData};
pub use bounds::{Bounds, BoundsContract};
pub use command::{Command, CommandContract};
pub use event::Event;
pub use interactor::{Interactor, InteractorContract};
pub use mask::{Mask, MaskContract};
pub use message::{HeaderContract, Message, MessageContract, Metadata};
pub use notification::Notification;
pub use query::Query;
pub use snapshot::{Snapshot, SnapshotContract};
pub use state_bag::StateBag;

/// Engine window identifier; may be a literal such as the global window
pub type WindowId = serde_json::Value;
