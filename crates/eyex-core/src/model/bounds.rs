//! Spatial claim of an interactor or query.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{BoundsType, ProtocolConstants};
use crate::errors::Result;
use crate::geometry::Rect;

/// Bounds on the wire: `{boundsType, data}`.
///
/// Queries from the engine name the type field `type`; both spellings are
/// accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundsContract {
    /// Encoded bounds type
    #[serde(rename = "boundsType", alias = "type")]
    pub bounds_type: Value,
    /// Rectangle for rectangular bounds
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

/// Bounds of an interactor, snapshot or query.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Bounds {
    /// No spatial claim
    #[default]
    None,
    /// Axis aligned rectangle
    Rectangular(Rect),
}

impl Bounds {
    /// Rectangle, if rectangular
    pub fn rect(&self) -> Option<&Rect> {
        match self {
            Bounds::Rectangular(rect) => Some(rect),
            Bounds::None => None,
        }
    }

    /// Bounds type
    pub fn bounds_type(&self) -> BoundsType {
        match self {
            Bounds::None => BoundsType::None,
            Bounds::Rectangular(_) => BoundsType::Rectangular,
        }
    }

    /// Encode for the wire
    pub fn to_contract(&self, constants: &ProtocolConstants) -> Result<BoundsContract> {
        let data = match self {
            Bounds::None => Value::Null,
            Bounds::Rectangular(rect) => serde_json::to_value(rect)?,
        };
        Ok(BoundsContract {
            bounds_type: constants.encode(self.bounds_type()),
            data,
        })
    }

    /// Decode a wire value
    pub fn from_contract(contract: &BoundsContract, constants: &ProtocolConstants) -> Result<Self> {
        match constants.decode_required::<BoundsType>(&contract.bounds_type)? {
            BoundsType::None => Ok(Bounds::None),
            BoundsType::Rectangular => Ok(Bounds::Rectangular(Rect::deserialize(&contract.data)?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn query_spelling_is_accepted() {
        let contract: BoundsContract = serde_json::from_value(json!({
            "type": "rectangular",
            "data": {"x": 1.0, "y": 2.0, "width": 3.0, "height": 4.0}
        }))
        .unwrap();
        let bounds = Bounds::from_contract(&contract, &ProtocolConstants::default()).unwrap();
        assert_eq!(bounds, Bounds::Rectangular(Rect::new(1.0, 2.0, 3.0, 4.0)));
    }

    #[test]
    fn none_bounds_have_no_data() {
        let contract = Bounds::None.to_contract(&ProtocolConstants::default()).unwrap();
        assert_eq!(serde_json::to_value(contract).unwrap(), json!({"boundsType": "none"}));
    }
}
