//! Snapshots answer queries with the interactors inside a region.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::constants::ProtocolConstants;
use crate::errors::Result;
use crate::model::bounds::{Bounds, BoundsContract};
use crate::model::interactor::{Interactor, InteractorContract};
use crate::model::query::Query;
use crate::model::WindowId;

/// Snapshot on the wire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotContract {
    /// Engine time of the commit, in milliseconds
    pub timestamp: f64,
    /// Region the snapshot covers, in screen coordinates
    pub bounds: BoundsContract,
    /// Interactors
    pub interactors: Vec<InteractorContract>,
    /// Windows the snapshot covers
    pub window_ids: Vec<WindowId>,
}

/// An atomic batch of interactor state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    bounds: Bounds,
    window_ids: Vec<WindowId>,
    interactors: IndexMap<String, Interactor>,
}

impl Snapshot {
    /// Empty snapshot with no bounds
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty snapshot answering `query`: same bounds and windows
    pub fn for_query(query: &Query) -> Self {
        Self {
            bounds: query.bounds,
            window_ids: query.window_ids.clone(),
            interactors: IndexMap::new(),
        }
    }

    /// Region the snapshot covers
    pub fn bounds(&self) -> &Bounds {
        &self.bounds
    }

    /// Set the covered region
    pub fn set_bounds(&mut self, bounds: Bounds) {
        self.bounds = bounds;
    }

    /// Windows the snapshot covers
    pub fn window_ids(&self) -> &[WindowId] {
        &self.window_ids
    }

    /// Set the covered windows
    pub fn set_window_ids(&mut self, window_ids: Vec<WindowId>) {
        self.window_ids = window_ids;
    }

    /// Insert a fresh interactor and return it for editing
    pub fn create_interactor(&mut self, id: impl Into<String>) -> &mut Interactor {
        let id = id.into();
        self.interactors
            .entry(id.clone())
            .or_insert_with(|| Interactor::new(id))
    }

    /// Insert or replace an interactor
    pub fn add_interactor(&mut self, interactor: Interactor) {
        self.interactors.insert(interactor.id.clone(), interactor);
    }

    /// Interactor by full id
    pub fn interactor(&self, id: &str) -> Option<&Interactor> {
        self.interactors.get(id)
    }

    /// Interactors in insertion order
    pub fn interactors(&self) -> impl Iterator<Item = &Interactor> {
        self.interactors.values()
    }

    /// Number of interactors
    pub fn len(&self) -> usize {
        self.interactors.len()
    }

    /// Whether the snapshot holds no interactors
    pub fn is_empty(&self) -> bool {
        self.interactors.is_empty()
    }

    /// Encode for the wire with the commit timestamp
    pub fn to_contract(&self, constants: &ProtocolConstants, timestamp: f64) -> Result<SnapshotContract> {
        Ok(SnapshotContract {
            timestamp,
            bounds: self.bounds.to_contract(constants)?,
            interactors: self
                .interactors
                .values()
                .map(|i| i.to_contract(constants))
                .collect::<Result<_>>()?,
            window_ids: self.window_ids.clone(),
        })
    }
}
