//! Server-visible interactors.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{BehaviorType, ProtocolConstants, ROOT_ID_LITERAL};
use crate::errors::{EyeXError, Result};
use crate::model::behavior::{Behavior, BehaviorContract, BehaviorData};
use crate::model::bounds::{Bounds, BoundsContract};
use crate::model::mask::{Mask, MaskContract};
use crate::model::WindowId;

/// Interactor on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractorContract {
    /// Full id (`<managerId>/<localId>` for managed interactors)
    pub id: String,
    /// Parent id, or the root literal
    pub parent_id: Value,
    /// Whether the engine should consider the interactor
    pub is_enabled: bool,
    /// Tombstone flag
    pub is_deleted: bool,
    /// Stacking order
    pub z: f64,
    /// Spatial claim in screen coordinates
    pub bounds: BoundsContract,
    /// Behaviors
    pub behaviors: Vec<BehaviorContract>,
    /// Owning window
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_id: Option<WindowId>,
    /// Optional mask over the bounds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<MaskContract>,
}

/// A gaze-interactive region with behaviors.
#[derive(Debug, Clone, PartialEq)]
pub struct Interactor {
    /// Full id
    pub id: String,
    /// Parent id; `None` is the root of the tree
    pub parent_id: Option<String>,
    /// Whether the engine should consider the interactor
    pub is_enabled: bool,
    /// Tombstone flag
    pub is_deleted: bool,
    /// Stacking order
    pub z: f64,
    /// Spatial claim in screen coordinates
    pub bounds: Bounds,
    /// Behaviors keyed by type
    pub behaviors: IndexMap<BehaviorType, Behavior>,
    /// Owning window
    pub window_id: Option<WindowId>,
    /// Optional mask over the bounds
    pub mask: Option<Mask>,
}

impl Interactor {
    /// Create an enabled interactor under the root
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
            is_enabled: true,
            is_deleted: false,
            z: 0.0,
            bounds: Bounds::None,
            behaviors: IndexMap::new(),
            window_id: None,
            mask: None,
        }
    }

    /// Add or replace a behavior
    pub fn set_behavior(&mut self, behavior_type: BehaviorType, data: BehaviorData) {
        self.behaviors
            .insert(behavior_type, Behavior::new(behavior_type, data));
    }

    /// Remove a behavior
    pub fn clear_behavior(&mut self, behavior_type: BehaviorType) -> Option<Behavior> {
        self.behaviors.shift_remove(&behavior_type)
    }

    /// Behavior of the given type
    pub fn behavior(&self, behavior_type: BehaviorType) -> Option<&Behavior> {
        self.behaviors.get(&behavior_type)
    }

    /// Encode for the wire
    pub fn to_contract(&self, constants: &ProtocolConstants) -> Result<InteractorContract> {
        Ok(InteractorContract {
            id: self.id.clone(),
            parent_id: self
                .parent_id
                .clone()
                .map(Value::String)
                .unwrap_or_else(|| constants.literal(ROOT_ID_LITERAL)),
            is_enabled: self.is_enabled,
            is_deleted: self.is_deleted,
            z: self.z,
            bounds: self.bounds.to_contract(constants)?,
            behaviors: self
                .behaviors
                .values()
                .map(|b| b.to_contract(constants))
                .collect(),
            window_id: self.window_id.clone(),
            mask: self.mask.as_ref().map(Mask::to_contract),
        })
    }

    /// Decode a wire value
    pub fn from_contract(contract: &InteractorContract, constants: &ProtocolConstants) -> Result<Self> {
        let parent_id = if contract.parent_id == constants.literal(ROOT_ID_LITERAL) {
            None
        } else {
            let parent = contract.parent_id.as_str().ok_or_else(|| {
                EyeXError::protocol(format!("parentId must be a string: {}", contract.parent_id))
            })?;
            Some(parent.to_string())
        };

        let mut behaviors = IndexMap::new();
        for behavior in &contract.behaviors {
            let behavior = Behavior::from_contract(behavior, constants)?;
            behaviors.insert(behavior.behavior_type, behavior);
        }

        Ok(Self {
            id: contract.id.clone(),
            parent_id,
            is_enabled: contract.is_enabled,
            is_deleted: contract.is_deleted,
            z: contract.z,
            bounds: Bounds::from_contract(&contract.bounds, constants)?,
            behaviors,
            window_id: contract.window_id.clone(),
            mask: contract.mask.as_ref().map(Mask::from_contract).transpose()?,
        })
    }
}
