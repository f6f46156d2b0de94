//! Behaviors attached to interactors and reported in events.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::constants::{
    BehaviorType, FixationDataMode, GazeAwareMode, GazePointDataMode, PanDirection,
    PanningProfile, ProtocolConstants,
};
use crate::errors::Result;

/// Behavior on the wire: `{behaviorType, data}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorContract {
    /// Encoded behavior type
    pub behavior_type: Value,
    /// Behavior payload
    #[serde(default)]
    pub data: Value,
}

/// Behavior payload.
///
/// Interactor parameters for the known behaviors are typed so that their
/// enum fields follow the constants in force when the snapshot is encoded.
/// Event payloads and anything else stay raw.
#[derive(Debug, Clone, PartialEq)]
pub enum BehaviorData {
    /// Activatable parameters
    Activatable {
        /// Whether tentative activation focus is reported
        is_tentative_focus_enabled: bool,
    },
    /// Pannable parameters
    Pannable {
        /// Hands-free panning
        pan_hands_free: bool,
        /// Panning profile
        panning_profile: PanningProfile,
        /// Accepted directions
        pan_directions_available: PanDirection,
    },
    /// Gaze-aware parameters
    GazeAware {
        /// Reporting mode
        gaze_aware_mode: GazeAwareMode,
        /// Delay before reporting, in milliseconds
        delay_time: f64,
    },
    /// Gaze point stream parameters
    GazePointData {
        /// Filtering mode
        gaze_point_data_mode: GazePointDataMode,
    },
    /// Fixation stream parameters
    FixationData {
        /// Sensitivity
        fixation_data_mode: FixationDataMode,
    },
    /// Untyped payload
    Raw(Value),
}

impl BehaviorData {
    /// Raw payload, if untyped
    pub fn as_raw(&self) -> Option<&Value> {
        match self {
            BehaviorData::Raw(value) => Some(value),
            _ => None,
        }
    }

    fn to_value(&self, constants: &ProtocolConstants) -> Value {
        match self {
            BehaviorData::Activatable {
                is_tentative_focus_enabled,
            } => json!({ "isTentativeFocusEnabled": is_tentative_focus_enabled }),
            BehaviorData::Pannable {
                pan_hands_free,
                panning_profile,
                pan_directions_available,
            } => json!({
                "panHandsFree": pan_hands_free,
                "panningProfile": constants.encode(*panning_profile),
                "panDirectionsAvailable": constants.encode(*pan_directions_available),
            }),
            BehaviorData::GazeAware {
                gaze_aware_mode,
                delay_time,
            } => json!({
                "gazeAwareMode": constants.encode(*gaze_aware_mode),
                "delayTime": delay_time,
            }),
            BehaviorData::GazePointData {
                gaze_point_data_mode,
            } => json!({ "gazePointDataMode": constants.encode(*gaze_point_data_mode) }),
            BehaviorData::FixationData { fixation_data_mode } => {
                json!({ "fixationDataMode": constants.encode(*fixation_data_mode) })
            }
            BehaviorData::Raw(value) => value.clone(),
        }
    }

    fn from_value(behavior_type: BehaviorType, data: &Value, constants: &ProtocolConstants) -> Self {
        let typed = match behavior_type {
            BehaviorType::Activatable => data
                .get("isTentativeFocusEnabled")
                .and_then(Value::as_bool)
                .map(|is_tentative_focus_enabled| BehaviorData::Activatable {
                    is_tentative_focus_enabled,
                }),
            BehaviorType::Pannable => (|| {
                Some(BehaviorData::Pannable {
                    pan_hands_free: data.get("panHandsFree")?.as_bool()?,
                    panning_profile: constants.decode(data.get("panningProfile")?)?,
                    pan_directions_available: constants.decode(data.get("panDirectionsAvailable")?)?,
                })
            })(),
            BehaviorType::GazeAware => (|| {
                Some(BehaviorData::GazeAware {
                    gaze_aware_mode: constants.decode(data.get("gazeAwareMode")?)?,
                    delay_time: data.get("delayTime")?.as_f64()?,
                })
            })(),
            BehaviorType::GazePointData => data
                .get("gazePointDataMode")
                .and_then(|v| constants.decode(v))
                .map(|gaze_point_data_mode| BehaviorData::GazePointData {
                    gaze_point_data_mode,
                }),
            BehaviorType::FixationData => data
                .get("fixationDataMode")
                .and_then(|v| constants.decode(v))
                .map(|fixation_data_mode| BehaviorData::FixationData { fixation_data_mode }),
            BehaviorType::EyePositionData => None,
        };
        typed.unwrap_or_else(|| BehaviorData::Raw(data.clone()))
    }
}

/// A typed capability of an interactor.
#[derive(Debug, Clone, PartialEq)]
pub struct Behavior {
    /// Behavior type
    pub behavior_type: BehaviorType,
    /// Payload
    pub data: BehaviorData,
}

impl Behavior {
    /// Create a behavior
    pub fn new(behavior_type: BehaviorType, data: BehaviorData) -> Self {
        Self {
            behavior_type,
            data,
        }
    }

    /// Create a behavior with an untyped payload
    pub fn raw(behavior_type: BehaviorType, data: Value) -> Self {
        Self::new(behavior_type, BehaviorData::Raw(data))
    }

    /// Encode for the wire
    pub fn to_contract(&self, constants: &ProtocolConstants) -> BehaviorContract {
        BehaviorContract {
            behavior_type: constants.encode(self.behavior_type),
            data: self.data.to_value(constants),
        }
    }

    /// Decode interactor parameters, typing known payload shapes
    pub fn from_contract(contract: &BehaviorContract, constants: &ProtocolConstants) -> Result<Self> {
        let behavior_type = constants.decode_required(&contract.behavior_type)?;
        Ok(Self::new(
            behavior_type,
            BehaviorData::from_value(behavior_type, &contract.data, constants),
        ))
    }

    /// Decode an event payload, keeping the data raw
    pub fn from_event_contract(
        contract: &BehaviorContract,
        constants: &ProtocolConstants,
    ) -> Result<Self> {
        Ok(Self::raw(
            constants.decode_required(&contract.behavior_type)?,
            contract.data.clone(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pannable_parameters_use_current_constants() {
        let constants = ProtocolConstants::from_handshake(&json!({
            "constants": {"panningProfile": {"vertical": 4}, "panDirection": {"all": 15}}
        }))
        .unwrap();
        let behavior = Behavior::new(
            BehaviorType::Pannable,
            BehaviorData::Pannable {
                pan_hands_free: false,
                panning_profile: PanningProfile::Vertical,
                pan_directions_available: PanDirection::All,
            },
        );
        let contract = behavior.to_contract(&constants);
        assert_eq!(
            contract.data,
            json!({"panHandsFree": false, "panningProfile": 4, "panDirectionsAvailable": 15})
        );
        assert_eq!(Behavior::from_contract(&contract, &constants).unwrap(), behavior);
    }

    #[test]
    fn event_payloads_stay_raw() {
        let contract = BehaviorContract {
            behavior_type: json!("activatable"),
            data: json!({"activatableEventType": "activated"}),
        };
        let behavior =
            Behavior::from_event_contract(&contract, &ProtocolConstants::default()).unwrap();
        assert_eq!(
            behavior.data.as_raw(),
            Some(&json!({"activatableEventType": "activated"}))
        );
    }
}
