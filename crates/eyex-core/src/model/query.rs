//! Engine queries.

use serde::Deserialize;
use serde_json::Value;

use crate::constants::ProtocolConstants;
use crate::errors::Result;
use crate::model::bounds::{Bounds, BoundsContract};
use crate::model::WindowId;

#[derive(Deserialize)]
struct QueryContract {
    data: QueryData,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryData {
    bounds: BoundsContract,
    #[serde(default)]
    window_ids: Vec<WindowId>,
}

/// Request for every interactor overlapping a region.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Region in screen coordinates
    pub bounds: Bounds,
    /// Windows the query covers
    pub window_ids: Vec<WindowId>,
}

impl Query {
    /// Decode a query message body
    pub fn from_body(body: &Value, constants: &ProtocolConstants) -> Result<Self> {
        let contract = QueryContract::deserialize(body)?;
        Ok(Self {
            bounds: Bounds::from_contract(&contract.data.bounds, constants)?,
            window_ids: contract.data.window_ids,
        })
    }
}
