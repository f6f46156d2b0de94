//! Chainable interactor configuration.

use std::sync::Arc;

use eyex_core::{
    BehaviorData, BehaviorType, EyeXError, GazeAwareMode, Mask, PanDirection, PanningProfile, Rect,
    Result,
};
use serde_json::Value;

use super::descriptor::{InteractorEventName, MutableInteractorDescriptor};
use super::InteractorDescriptor;

/// Builder-style handle on one interactor.
///
/// Every setter returns `Result<&Self>` so calls chain with `?`. Once the
/// interactor is removed, every operation fails with
/// [`EyeXError::InvalidConfiguration`](eyex_core::EyeXError::InvalidConfiguration).
#[derive(Debug, Clone)]
pub struct InteractorConfiguration {
    descriptor: Arc<MutableInteractorDescriptor>,
}

impl InteractorConfiguration {
    pub(crate) fn new(descriptor: Arc<MutableInteractorDescriptor>) -> Self {
        Self { descriptor }
    }

    /// Underlying descriptor
    pub fn descriptor(&self) -> &Arc<MutableInteractorDescriptor> {
        &self.descriptor
    }

    /// Local id of the interactor
    pub fn id(&self) -> &str {
        self.descriptor.id()
    }

    /// Whether the interactor has not been removed
    pub fn is_valid(&self) -> bool {
        !self.descriptor.is_removed()
    }

    /// Detach the interactor from its manager
    pub fn remove(&self) -> Result<()> {
        self.descriptor.remove()
    }

    /// Move or resize, in client coordinates
    pub fn set_bounds(&self, x: f64, y: f64, width: f64, height: f64) -> Result<&Self> {
        self.descriptor
            .set_bounding_rect(Rect::new(x, y, width, height))?;
        Ok(self)
    }

    /// Client-space bounds
    pub fn bounds(&self) -> Result<Rect> {
        self.live()?;
        Ok(self.descriptor.bounding_rect())
    }

    /// Set the stacking order
    pub fn set_z(&self, z: f64) -> Result<&Self> {
        self.descriptor.set_z(z)?;
        Ok(self)
    }

    /// Stacking order
    pub fn z(&self) -> Result<f64> {
        self.live()?;
        Ok(self.descriptor.z())
    }

    /// Set or clear the mask
    pub fn set_mask(&self, mask: Option<Mask>) -> Result<&Self> {
        self.descriptor.set_mask(mask)?;
        Ok(self)
    }

    /// Current mask
    pub fn mask(&self) -> Result<Option<Mask>> {
        self.live()?;
        Ok(self.descriptor.mask())
    }

    /// Add or replace a behavior
    pub fn set_behavior(&self, behavior_type: BehaviorType, data: BehaviorData) -> Result<&Self> {
        self.descriptor.set_behavior(behavior_type, data)?;
        Ok(self)
    }

    /// Remove a behavior
    pub fn clear_behavior(&self, behavior_type: BehaviorType) -> Result<&Self> {
        self.descriptor.clear_behavior(behavior_type)?;
        Ok(self)
    }

    /// Make the interactor activatable; tentative focus defaults to enabled
    pub fn make_activatable(&self, is_tentative_focus_enabled: Option<bool>) -> Result<&Self> {
        self.set_behavior(
            BehaviorType::Activatable,
            BehaviorData::Activatable {
                is_tentative_focus_enabled: is_tentative_focus_enabled.unwrap_or(true),
            },
        )
    }

    /// Make the interactor pannable; defaults to vertical panning in all directions
    pub fn make_pannable(
        &self,
        panning_profile: Option<PanningProfile>,
        pan_directions_available: Option<PanDirection>,
    ) -> Result<&Self> {
        self.set_behavior(
            BehaviorType::Pannable,
            BehaviorData::Pannable {
                pan_hands_free: false,
                panning_profile: panning_profile.unwrap_or(PanningProfile::Vertical),
                pan_directions_available: pan_directions_available.unwrap_or(PanDirection::All),
            },
        )
    }

    /// Make the interactor gaze aware; defaults to normal mode without delay
    pub fn make_gaze_aware(&self, gaze_aware_mode: Option<GazeAwareMode>, delay_time: Option<f64>) -> Result<&Self> {
        self.set_behavior(
            BehaviorType::GazeAware,
            BehaviorData::GazeAware {
                gaze_aware_mode: gaze_aware_mode.unwrap_or(GazeAwareMode::Normal),
                delay_time: delay_time.unwrap_or(0.0),
            },
        )
    }

    /// Subscribe to an event by name.
    ///
    /// Fails with `UnknownEventName` for names no interactor raises.
    pub fn on(
        &self,
        event_name: &str,
        callback: impl Fn(&Value) -> bool + Send + Sync + 'static,
    ) -> Result<&Self> {
        let name = event_name.parse::<InteractorEventName>()?;
        self.descriptor
            .register_event_callback(name, Arc::new(callback))?;
        Ok(self)
    }

    /// Activation focus changes
    pub fn activation_focus_changed(&self, callback: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Result<&Self> {
        self.on(InteractorEventName::ActivationFocusChanged.as_str(), callback)
    }

    /// Activation
    pub fn activated(&self, callback: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Result<&Self> {
        self.on(InteractorEventName::Activated.as_str(), callback)
    }

    /// Gaze entering
    pub fn gaze_enter(&self, callback: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Result<&Self> {
        self.on(InteractorEventName::GazeEnter.as_str(), callback)
    }

    /// Gaze leaving
    pub fn gaze_leave(&self, callback: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Result<&Self> {
        self.on(InteractorEventName::GazeLeave.as_str(), callback)
    }

    /// Continuous panning
    pub fn panning_pan(&self, callback: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Result<&Self> {
        self.on(InteractorEventName::PanningPan.as_str(), callback)
    }

    /// Pan steps
    pub fn panning_step(&self, callback: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Result<&Self> {
        self.on(InteractorEventName::PanningStep.as_str(), callback)
    }

    /// Hands-free panning toggles
    pub fn panning_hands_free(&self, callback: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Result<&Self> {
        self.on(InteractorEventName::PanningHandsFree.as_str(), callback)
    }

    fn live(&self) -> Result<()> {
        if self.descriptor.is_removed() {
            return Err(EyeXError::InvalidConfiguration);
        }
        Ok(())
    }
}
