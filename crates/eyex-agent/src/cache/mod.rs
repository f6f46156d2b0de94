//! Spatial caches of interactor descriptors.

mod bsp;
mod standard;

use std::sync::Arc;

use eyex_core::Rect;

use crate::interactors::InteractorDescriptor;

pub use bsp::{BspTree, Found, NodeId, DEFAULT_MIN_SIZE};
pub use standard::StandardInteractorCache;

/// Index of descriptors by id and by client-space rectangle.
///
/// Entries are never updated in place: a descriptor whose rectangle changes
/// is removed and added again.
pub trait InteractorCache: Send {
    /// Track a descriptor under its current rectangle
    fn add(&mut self, descriptor: Arc<dyn InteractorDescriptor>);

    /// Stop tracking a descriptor
    fn remove(&mut self, id: &str) -> Option<Arc<dyn InteractorDescriptor>>;

    /// Descriptors whose rectangle overlaps `bounds`
    fn find(&self, bounds: &Rect) -> Vec<Arc<dyn InteractorDescriptor>>;

    /// Descriptor by local id
    fn get(&self, id: &str) -> Option<Arc<dyn InteractorDescriptor>>;

    /// Re-index every tracked descriptor under a new bounding rectangle
    fn set_bounds(&mut self, bounds: Rect);

    /// Current bounding rectangle
    fn bounds(&self) -> Rect;

    /// Number of tracked descriptors
    fn len(&self) -> usize;

    /// Whether nothing is tracked
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
