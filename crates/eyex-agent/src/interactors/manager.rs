//! Interactor managers
//!
//! A manager owns a family of interactors whose engine ids share its id as
//! prefix (`<manager id>/<local id>`). The [`Agent`](crate::Agent) asks every
//! manager to contribute to each query's snapshot and routes each event to
//! the manager named by its prefix.

use std::sync::{Arc, Weak};

use eyex_core::{
    invoke_isolated, CoordinateConverter, CoordinatesFacade, Event, Rect, Snapshot,
    SubscriptionTicket,
};
use indexmap::IndexSet;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::cache::{InteractorCache, StandardInteractorCache};
use crate::context::Context;
use crate::interactors::InteractorDescriptor;

/// A family of interactors answering queries and receiving events.
pub trait InteractorManager: Send + Sync {
    /// Id used as prefix of every interactor id of this manager
    fn id(&self) -> &str;

    /// Called once when the manager is added to an agent
    fn initialize(&self, _context: &Arc<Context>) {}

    /// Descriptors relevant to a client-space region
    fn find_interactor_descriptors(&self, bounds: &Rect) -> Vec<Arc<dyn InteractorDescriptor>>;

    /// Descriptor by local id
    fn interactor_descriptor(&self, id: &str) -> Option<Arc<dyn InteractorDescriptor>>;

    /// Add this manager's interactors inside the snapshot's region
    fn populate_snapshot(&self, snapshot: &mut Snapshot, context: &Context) {
        let Some(screen_bounds) = snapshot.bounds().rect().copied() else {
            trace!(manager = self.id(), "Snapshot without rectangular bounds");
            return;
        };
        let coords = context.coords();
        let client_bounds = coords.screen_to_client(&screen_bounds);
        for descriptor in self.find_interactor_descriptors(&client_bounds) {
            descriptor.populate_snapshot(snapshot, coords.as_ref());
        }
    }

    /// Deliver an event addressed to one of this manager's interactors
    fn handle_event(&self, event: &Event, context: &Context) {
        let Some((_, local_id)) = event.interactor_id.split_once('/') else {
            return;
        };
        let Some(descriptor) = self.interactor_descriptor(local_id) else {
            trace!(interactor_id = %event.interactor_id, "Event for unknown interactor");
            return;
        };
        descriptor.handle_event(event, &context.constants());
    }
}

/// The standard manager, backed by a spatial cache.
///
/// Without an explicit bounding rectangle the cache covers the virtual
/// bounds of the coordinate converter and follows them as they change.
pub struct CachingInteractorManager {
    id: String,
    coords: Arc<CoordinatesFacade>,
    cache: Mutex<Box<dyn InteractorCache>>,
    subscription: Mutex<Option<SubscriptionTicket>>,
}

impl CachingInteractorManager {
    /// Create a manager with a [`StandardInteractorCache`]
    pub fn new(
        id: impl Into<String>,
        coords: Arc<CoordinatesFacade>,
        bounding_rect: Option<Rect>,
        min_size: f64,
    ) -> Arc<Self> {
        let bounds = bounding_rect.unwrap_or_else(|| coords.virtual_bounds());
        Self::with_cache(
            id,
            coords,
            Box::new(StandardInteractorCache::with_min_size(bounds, min_size)),
            bounding_rect.is_none(),
        )
    }

    /// Create a manager over any cache
    pub fn with_cache(
        id: impl Into<String>,
        coords: Arc<CoordinatesFacade>,
        cache: Box<dyn InteractorCache>,
        follow_virtual_bounds: bool,
    ) -> Arc<Self> {
        let manager = Arc::new(Self {
            id: id.into(),
            coords,
            cache: Mutex::new(cache),
            subscription: Mutex::new(None),
        });
        if follow_virtual_bounds {
            let weak: Weak<Self> = Arc::downgrade(&manager);
            let ticket = manager.coords.virtual_bounds_changed.subscribe(move || {
                if let Some(manager) = weak.upgrade() {
                    manager.on_virtual_bounds_changed();
                }
            });
            *manager.subscription.lock() = Some(ticket);
        }
        manager
    }

    /// `<manager id>/<local id>`
    pub fn qualified_id(&self, local_id: &str) -> String {
        format!("{}/{}", self.id, local_id)
    }

    /// Start tracking a descriptor
    pub fn add_interactor_descriptor(&self, descriptor: Arc<dyn InteractorDescriptor>) {
        self.cache.lock().add(descriptor);
    }

    /// Stop tracking a descriptor
    pub fn remove_interactor_descriptor(&self, id: &str) -> Option<Arc<dyn InteractorDescriptor>> {
        self.cache.lock().remove(id)
    }

    /// Re-index the cache under a new bounding rectangle
    pub fn update_cache_bounds(&self, bounds: Rect) {
        debug!(manager = %self.id, ?bounds, "Resizing interactor cache");
        self.cache.lock().set_bounds(bounds);
    }

    /// Bounding rectangle of the cache
    pub fn cache_bounds(&self) -> Rect {
        self.cache.lock().bounds()
    }

    /// Number of tracked descriptors
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Whether nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn on_virtual_bounds_changed(&self) {
        let bounds = self.coords.virtual_bounds();
        invoke_isolated("virtual bounds resize", || self.update_cache_bounds(bounds));
    }
}

impl InteractorManager for CachingInteractorManager {
    fn id(&self) -> &str {
        &self.id
    }

    fn initialize(&self, _context: &Arc<Context>) {
        debug!(manager = %self.id, "Interactor manager initialized");
    }

    /// Overlapping descriptors followed by any missing ancestors
    fn find_interactor_descriptors(&self, bounds: &Rect) -> Vec<Arc<dyn InteractorDescriptor>> {
        let cache = self.cache.lock();
        let mut included: IndexSet<String> = IndexSet::new();
        let mut result = Vec::new();
        for hit in cache.find(bounds) {
            let mut next = Some(hit);
            while let Some(descriptor) = next.take() {
                if !included.insert(descriptor.id().to_string()) {
                    break;
                }
                next = descriptor.parent_id().and_then(|parent| cache.get(parent));
                result.push(descriptor);
            }
        }
        result
    }

    fn interactor_descriptor(&self, id: &str) -> Option<Arc<dyn InteractorDescriptor>> {
        self.cache.lock().get(id)
    }
}

impl Drop for CachingInteractorManager {
    fn drop(&mut self) {
        if let Some(ticket) = self.subscription.get_mut().take() {
            self.coords.virtual_bounds_changed.unsubscribe(ticket);
        }
    }
}

impl std::fmt::Debug for CachingInteractorManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachingInteractorManager")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interactors::MutableInteractorDescriptor;
    use eyex_core::IdentityConverter;

    fn coords() -> Arc<CoordinatesFacade> {
        Arc::new(CoordinatesFacade::new(Arc::new(IdentityConverter::new(
            Rect::new(0.0, 0.0, 1000.0, 1000.0),
        ))))
    }

    fn ids(found: &[Arc<dyn InteractorDescriptor>]) -> Vec<String> {
        found.iter().map(|d| d.id().to_string()).collect()
    }

    #[test]
    fn find_includes_ancestors_once() {
        let manager = CachingInteractorManager::new("m", coords(), None, 100.0);
        let root = MutableInteractorDescriptor::create(&manager, "1", Rect::new(0.0, 0.0, 900.0, 900.0), None, 0.0);
        let panel = MutableInteractorDescriptor::create(&manager, "2", Rect::new(600.0, 600.0, 200.0, 200.0), Some(&root), 0.0);
        let _a = MutableInteractorDescriptor::create(&manager, "3", Rect::new(610.0, 610.0, 10.0, 10.0), Some(&panel), 0.0);
        let _b = MutableInteractorDescriptor::create(&manager, "4", Rect::new(640.0, 610.0, 10.0, 10.0), Some(&panel), 0.0);

        let found = manager.find_interactor_descriptors(&Rect::new(605.0, 605.0, 50.0, 20.0));
        let mut found = ids(&found);
        found.sort();
        assert_eq!(found, vec!["1", "2", "3", "4"]);
    }

    #[test]
    fn parents_outside_the_region_are_still_included() {
        let manager = CachingInteractorManager::new("m", coords(), None, 100.0);
        let parent = MutableInteractorDescriptor::create(&manager, "p", Rect::new(0.0, 0.0, 10.0, 10.0), None, 0.0);
        let _child = MutableInteractorDescriptor::create(&manager, "c", Rect::new(500.0, 500.0, 10.0, 10.0), Some(&parent), 0.0);

        let found = manager.find_interactor_descriptors(&Rect::new(495.0, 495.0, 20.0, 20.0));
        assert_eq!(ids(&found), vec!["c", "p"]);
    }

    #[test]
    fn follows_virtual_bounds() {
        let converter = Arc::new(IdentityConverter::new(Rect::new(0.0, 0.0, 1000.0, 1000.0)));
        let coords = Arc::new(CoordinatesFacade::new(converter.clone()));
        let manager = CachingInteractorManager::new("m", Arc::clone(&coords), None, 100.0);
        let _far = MutableInteractorDescriptor::create(&manager, "far", Rect::new(2500.0, 2500.0, 10.0, 10.0), None, 0.0);

        converter.set_virtual_bounds(Rect::new(0.0, 0.0, 4000.0, 4000.0));
        coords.virtual_bounds_changed.raise();

        assert_eq!(manager.cache_bounds(), Rect::new(0.0, 0.0, 4000.0, 4000.0));
        assert_eq!(manager.len(), 1);
        assert_eq!(
            ids(&manager.find_interactor_descriptors(&Rect::new(2500.0, 2500.0, 1.0, 1.0))),
            vec!["far"]
        );
    }

    #[test]
    fn explicit_bounds_ignore_virtual_bounds() {
        let coords = coords();
        let manager = CachingInteractorManager::new("m", Arc::clone(&coords), Some(Rect::new(0.0, 0.0, 50.0, 50.0)), 100.0);
        coords.virtual_bounds_changed.raise();
        assert_eq!(manager.cache_bounds(), Rect::new(0.0, 0.0, 50.0, 50.0));
        assert!(coords.virtual_bounds_changed.is_empty());
    }

    #[test]
    fn dropping_manager_unsubscribes() {
        let coords = coords();
        let manager = CachingInteractorManager::new("m", Arc::clone(&coords), None, 100.0);
        assert_eq!(coords.virtual_bounds_changed.len(), 1);
        drop(manager);
        assert!(coords.virtual_bounds_changed.is_empty());
    }
}
