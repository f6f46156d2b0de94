//! Interactor descriptors
//!
//! A descriptor is the client-side record behind one interactor: its
//! client-space rectangle for the cache, the interactor it contributes to
//! snapshots, and the application callbacks its events are delivered to.

use std::str::FromStr;
use std::sync::{Arc, Weak};

use eyex_core::{
    invoke_isolated, ActivatableEventType, BehaviorData, BehaviorType, Bounds,
    CoordinateConverter, Event, EyeXError, Interactor, Mask, PannableEventType,
    ProtocolConstants, Rect, Result, Snapshot,
};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, trace};

use super::manager::CachingInteractorManager;

/// What the interactor layer needs from a descriptor.
pub trait InteractorDescriptor: Send + Sync {
    /// Id local to the owning manager
    fn id(&self) -> &str;

    /// Local id of the parent, `None` under the root
    fn parent_id(&self) -> Option<&str>;

    /// Rectangle in client coordinates
    fn bounding_rect(&self) -> Rect;

    /// Add this descriptor's interactor to `snapshot`
    fn populate_snapshot(&self, snapshot: &mut Snapshot, coords: &dyn CoordinateConverter);

    /// Deliver an event; returns whether the default action should run
    fn handle_event(&self, _event: &Event, _constants: &ProtocolConstants) -> bool {
        true
    }
}

/// Names of the interactor callbacks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InteractorEventName {
    /// Activation focus moved onto or off the interactor
    ActivationFocusChanged,
    /// The interactor was activated
    Activated,
    /// Gaze entered the interactor
    GazeEnter,
    /// Gaze left the interactor
    GazeLeave,
    /// Continuous pan
    PanningPan,
    /// Discrete pan step
    PanningStep,
    /// Hands-free panning toggled
    PanningHandsFree,
}

impl InteractorEventName {
    /// Every event name
    pub const ALL: [InteractorEventName; 7] = [
        InteractorEventName::ActivationFocusChanged,
        InteractorEventName::Activated,
        InteractorEventName::GazeEnter,
        InteractorEventName::GazeLeave,
        InteractorEventName::PanningPan,
        InteractorEventName::PanningStep,
        InteractorEventName::PanningHandsFree,
    ];

    /// Name used by [`InteractorConfiguration::on`](super::InteractorConfiguration::on)
    pub fn as_str(self) -> &'static str {
        match self {
            InteractorEventName::ActivationFocusChanged => "activationfocuschanged",
            InteractorEventName::Activated => "activated",
            InteractorEventName::GazeEnter => "gazeenter",
            InteractorEventName::GazeLeave => "gazeleave",
            InteractorEventName::PanningPan => "panningpan",
            InteractorEventName::PanningStep => "panningstep",
            InteractorEventName::PanningHandsFree => "panninghandsfree",
        }
    }
}

impl FromStr for InteractorEventName {
    type Err = EyeXError;

    fn from_str(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|n| n.as_str() == name)
            .ok_or_else(|| EyeXError::UnknownEventName {
                name: name.to_string(),
            })
    }
}

impl std::fmt::Display for InteractorEventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interactor callback; returning `false` suppresses the default action.
///
/// Receives the behavior data of the event, or `null` for events that
/// carry none.
pub type EventCallback = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

struct DescriptorState {
    bounding_rect: Rect,
    interactor: Interactor,
    removed: bool,
}

/// The descriptor applications create through an
/// [`InteractorFacility`](super::InteractorFacility).
///
/// Bounds changes go through the owning manager: the descriptor leaves the
/// cache, changes, and is added again. Client-space bounds are converted to
/// screen space only when the interactor is written into a snapshot.
pub struct MutableInteractorDescriptor {
    id: String,
    parent_id: Option<String>,
    manager: Weak<CachingInteractorManager>,
    state: Mutex<DescriptorState>,
    callbacks: Mutex<IndexMap<InteractorEventName, Vec<EventCallback>>>,
}

impl MutableInteractorDescriptor {
    /// Create a descriptor and register it with `manager`
    pub fn create(
        manager: &Arc<CachingInteractorManager>,
        id: impl Into<String>,
        bounding_rect: Rect,
        parent: Option<&MutableInteractorDescriptor>,
        z: f64,
    ) -> Arc<Self> {
        let id = id.into();
        let mut interactor = Interactor::new(manager.qualified_id(&id));
        interactor.parent_id = parent.map(|p| manager.qualified_id(&p.id));
        interactor.z = z;

        let descriptor = Arc::new(Self {
            id,
            parent_id: parent.map(|p| p.id.clone()),
            manager: Arc::downgrade(manager),
            state: Mutex::new(DescriptorState {
                bounding_rect,
                interactor,
                removed: false,
            }),
            callbacks: Mutex::new(
                InteractorEventName::ALL
                    .into_iter()
                    .map(|name| (name, Vec::new()))
                    .collect(),
            ),
        });
        manager.add_interactor_descriptor(Arc::clone(&descriptor) as Arc<dyn InteractorDescriptor>);
        trace!(interactor_id = %descriptor.interactor_id(), "Interactor descriptor created");
        descriptor
    }

    /// Id as seen by the engine: `<manager id>/<local id>`
    pub fn interactor_id(&self) -> String {
        self.state.lock().interactor.id.clone()
    }

    /// Whether the descriptor has been removed
    pub fn is_removed(&self) -> bool {
        self.state.lock().removed
    }

    /// Move the descriptor, re-indexing it in the manager's cache
    pub fn set_bounding_rect(self: &Arc<Self>, bounding_rect: Rect) -> Result<()> {
        {
            let mut state = self.state.lock();
            if state.removed {
                return Err(EyeXError::InvalidConfiguration);
            }
            state.bounding_rect = bounding_rect;
        }
        let Some(manager) = self.manager.upgrade() else {
            return Ok(());
        };
        manager.remove_interactor_descriptor(&self.id);
        manager.add_interactor_descriptor(Arc::clone(self) as Arc<dyn InteractorDescriptor>);
        // A remove() that ran after the update may have been undone by the re-add
        if self.is_removed() {
            manager.remove_interactor_descriptor(&self.id);
        }
        Ok(())
    }

    /// Stacking order
    pub fn z(&self) -> f64 {
        self.state.lock().interactor.z
    }

    /// Set the stacking order
    pub fn set_z(&self, z: f64) -> Result<()> {
        self.with_interactor(|interactor| interactor.z = z)
    }

    /// Set or clear the mask
    pub fn set_mask(&self, mask: Option<Mask>) -> Result<()> {
        self.with_interactor(|interactor| interactor.mask = mask)
    }

    /// Current mask
    pub fn mask(&self) -> Option<Mask> {
        self.state.lock().interactor.mask.clone()
    }

    /// Add or replace a behavior
    pub fn set_behavior(&self, behavior_type: BehaviorType, data: BehaviorData) -> Result<()> {
        self.with_interactor(|interactor| interactor.set_behavior(behavior_type, data))
    }

    /// Remove a behavior
    pub fn clear_behavior(&self, behavior_type: BehaviorType) -> Result<()> {
        self.with_interactor(|interactor| {
            interactor.clear_behavior(behavior_type);
        })
    }

    /// Copy of the interactor this descriptor contributes, bounds excluded
    pub fn interactor(&self) -> Interactor {
        self.state.lock().interactor.clone()
    }

    /// Add a callback for `name`
    pub fn register_event_callback(&self, name: InteractorEventName, callback: EventCallback) -> Result<()> {
        self.ensure_live()?;
        self.callbacks.lock().entry(name).or_default().push(callback);
        Ok(())
    }

    /// Leave the manager; every later change fails
    pub fn remove(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if state.removed {
                return Err(EyeXError::InvalidConfiguration);
            }
            state.removed = true;
        }
        if let Some(manager) = self.manager.upgrade() {
            manager.remove_interactor_descriptor(&self.id);
        }
        debug!(interactor_id = %self.interactor_id(), "Interactor removed");
        Ok(())
    }

    fn ensure_live(&self) -> Result<()> {
        if self.is_removed() {
            return Err(EyeXError::InvalidConfiguration);
        }
        Ok(())
    }

    fn with_interactor(&self, f: impl FnOnce(&mut Interactor)) -> Result<()> {
        let mut state = self.state.lock();
        if state.removed {
            return Err(EyeXError::InvalidConfiguration);
        }
        f(&mut state.interactor);
        Ok(())
    }

    /// Run every callback for `name` in registration order
    fn call_event_callbacks(&self, name: InteractorEventName, data: &Value) -> bool {
        let callbacks: Vec<EventCallback> = self
            .callbacks
            .lock()
            .get(&name)
            .cloned()
            .unwrap_or_default();
        let mut perform_default_action = true;
        for callback in callbacks {
            if invoke_isolated(name.as_str(), || callback(data)) == Some(false) {
                perform_default_action = false;
            }
        }
        perform_default_action
    }

    fn on_activatable(&self, data: &Value, constants: &ProtocolConstants) -> bool {
        let kind = data
            .get("activatableEventType")
            .and_then(|v| constants.decode::<ActivatableEventType>(v));
        match kind {
            Some(ActivatableEventType::ActivationFocusChanged) => {
                self.call_event_callbacks(InteractorEventName::ActivationFocusChanged, data)
            }
            Some(ActivatableEventType::Activated) => {
                self.call_event_callbacks(InteractorEventName::Activated, &Value::Null)
            }
            None => true,
        }
    }

    fn on_pannable(&self, data: &Value, constants: &ProtocolConstants) -> bool {
        let kind = data
            .get("pannableEventType")
            .and_then(|v| constants.decode::<PannableEventType>(v));
        match kind {
            Some(PannableEventType::Pan) => self.call_event_callbacks(InteractorEventName::PanningPan, data),
            Some(PannableEventType::Step) => self.call_event_callbacks(InteractorEventName::PanningStep, data),
            Some(PannableEventType::HandsFree) => {
                self.call_event_callbacks(InteractorEventName::PanningHandsFree, data)
            }
            None => true,
        }
    }

    fn on_gaze_aware(&self, data: &Value) -> bool {
        let has_gaze = data.get("hasGaze").and_then(Value::as_bool).unwrap_or(false);
        if has_gaze {
            self.call_event_callbacks(InteractorEventName::GazeEnter, &Value::Null)
        } else {
            self.call_event_callbacks(InteractorEventName::GazeLeave, &Value::Null)
        }
    }
}

impl InteractorDescriptor for MutableInteractorDescriptor {
    fn id(&self) -> &str {
        &self.id
    }

    fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref()
    }

    fn bounding_rect(&self) -> Rect {
        self.state.lock().bounding_rect
    }

    fn populate_snapshot(&self, snapshot: &mut Snapshot, coords: &dyn CoordinateConverter) {
        let (mut interactor, rect) = {
            let state = self.state.lock();
            (state.interactor.clone(), state.bounding_rect)
        };
        interactor.bounds = Bounds::Rectangular(coords.client_to_screen(&rect));
        interactor.window_id = snapshot.window_ids().first().cloned();
        snapshot.add_interactor(interactor);
    }

    fn handle_event(&self, event: &Event, constants: &ProtocolConstants) -> bool {
        let mut perform_default_action = true;
        for behavior in event.behaviors.values() {
            let data = behavior.data.as_raw().unwrap_or(&Value::Null);
            let handled = match behavior.behavior_type {
                BehaviorType::Activatable => self.on_activatable(data, constants),
                BehaviorType::Pannable => self.on_pannable(data, constants),
                BehaviorType::GazeAware => self.on_gaze_aware(data),
                _ => true,
            };
            perform_default_action &= handled;
        }
        perform_default_action
    }
}

impl std::fmt::Debug for MutableInteractorDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MutableInteractorDescriptor")
            .field("id", &state.interactor.id)
            .field("bounding_rect", &state.bounding_rect)
            .field("removed", &state.removed)
            .finish()
    }
}
