//! Interactor events.

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::constants::{BehaviorType, ProtocolConstants};
use crate::errors::Result;
use crate::model::behavior::{Behavior, BehaviorContract};

#[derive(Deserialize)]
struct EventContract {
    data: EventData,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EventData {
    interactor_id: String,
    #[serde(default)]
    behaviors: BehaviorList,
}

/// The engine sends behaviors either as a list or keyed by type
#[derive(Deserialize)]
#[serde(untagged)]
enum BehaviorList {
    List(Vec<BehaviorContract>),
    Map(IndexMap<String, BehaviorContract>),
}

impl Default for BehaviorList {
    fn default() -> Self {
        BehaviorList::List(Vec::new())
    }
}

/// Something that happened to an interactor.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Full interactor id
    pub interactor_id: String,
    /// Behaviors describing what happened, payloads raw
    pub behaviors: IndexMap<BehaviorType, Behavior>,
}

impl Event {
    /// Create an event
    pub fn new(interactor_id: impl Into<String>, behaviors: Vec<Behavior>) -> Self {
        Self {
            interactor_id: interactor_id.into(),
            behaviors: behaviors
                .into_iter()
                .map(|b| (b.behavior_type, b))
                .collect(),
        }
    }

    /// Decode an event message body.
    ///
    /// Behaviors of a type this client does not know are skipped so the
    /// known ones in the same event are still delivered.
    pub fn from_body(body: &Value, constants: &ProtocolConstants) -> Result<Self> {
        let contract = EventContract::deserialize(body)?;
        let contracts: Vec<BehaviorContract> = match contract.data.behaviors {
            BehaviorList::List(list) => list,
            BehaviorList::Map(map) => map.into_values().collect(),
        };
        let behaviors = contracts
            .iter()
            .filter_map(|c| match Behavior::from_event_contract(c, constants) {
                Ok(behavior) => Some(behavior),
                Err(e) => {
                    debug!(behavior_type = %c.behavior_type, error = %e, "Skipping unknown event behavior");
                    None
                }
            })
            .collect();
        Ok(Self::new(contract.data.interactor_id, behaviors))
    }

    /// Behavior of the given type
    pub fn behavior(&self, behavior_type: BehaviorType) -> Option<&Behavior> {
        self.behaviors.get(&behavior_type)
    }
}
