//! BSP-backed interactor cache.

use std::collections::HashMap;
use std::sync::Arc;

use eyex_core::Rect;
use tracing::trace;

use super::bsp::{BspTree, NodeId, DEFAULT_MIN_SIZE};
use super::InteractorCache;
use crate::interactors::InteractorDescriptor;

struct Entry {
    descriptor: Arc<dyn InteractorDescriptor>,
    node: NodeId,
}

/// The cache used by [`CachingInteractorManager`](crate::interactors::CachingInteractorManager).
///
/// Remembers the tree node each descriptor landed in, so removal is a
/// direct delete from that node.
pub struct StandardInteractorCache {
    tree: BspTree<Arc<dyn InteractorDescriptor>>,
    entries: HashMap<String, Entry>,
}

impl StandardInteractorCache {
    /// Create a cache over `bounds` with the default cell size
    pub fn new(bounds: Rect) -> Self {
        Self::with_min_size(bounds, DEFAULT_MIN_SIZE)
    }

    /// Create a cache over `bounds` that splits down to `min_size`
    pub fn with_min_size(bounds: Rect, min_size: f64) -> Self {
        Self {
            tree: BspTree::new(bounds, min_size),
            entries: HashMap::new(),
        }
    }

    /// Find with diagnostics: matches plus the number of rectangles tested
    pub fn find_with_count(&self, bounds: &Rect) -> (Vec<Arc<dyn InteractorDescriptor>>, usize) {
        let found = self.tree.find(bounds);
        (
            found.items.into_iter().map(Arc::clone).collect(),
            found.test_count,
        )
    }
}

impl InteractorCache for StandardInteractorCache {
    fn add(&mut self, descriptor: Arc<dyn InteractorDescriptor>) {
        let id = descriptor.id().to_string();
        if let Some(previous) = self.entries.remove(&id) {
            self.tree.remove(previous.node, &id);
        }
        let node = self
            .tree
            .add(id.clone(), descriptor.bounding_rect(), Arc::clone(&descriptor));
        self.entries.insert(id, Entry { descriptor, node });
    }

    fn remove(&mut self, id: &str) -> Option<Arc<dyn InteractorDescriptor>> {
        let entry = self.entries.remove(id)?;
        self.tree.remove(entry.node, id);
        Some(entry.descriptor)
    }

    fn find(&self, bounds: &Rect) -> Vec<Arc<dyn InteractorDescriptor>> {
        let (matches, test_count) = self.find_with_count(bounds);
        trace!(matches = matches.len(), test_count, "Cache lookup");
        matches
    }

    fn get(&self, id: &str) -> Option<Arc<dyn InteractorDescriptor>> {
        self.entries.get(id).map(|e| Arc::clone(&e.descriptor))
    }

    fn set_bounds(&mut self, bounds: Rect) {
        let min_size = self.tree.min_size();
        let descriptors: Vec<_> = self.entries.drain().map(|(_, e)| e.descriptor).collect();
        self.tree = BspTree::new(bounds, min_size);
        for descriptor in descriptors {
            self.add(descriptor);
        }
    }

    fn bounds(&self) -> Rect {
        self.tree.bounds()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

impl std::fmt::Debug for StandardInteractorCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StandardInteractorCache")
            .field("bounds", &self.tree.bounds())
            .field("len", &self.entries.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use eyex_core::{CoordinateConverter, Snapshot};

    struct Fixed {
        id: String,
        rect: Rect,
    }

    impl InteractorDescriptor for Fixed {
        fn id(&self) -> &str {
            &self.id
        }

        fn parent_id(&self) -> Option<&str> {
            None
        }

        fn bounding_rect(&self) -> Rect {
            self.rect
        }

        fn populate_snapshot(&self, _snapshot: &mut Snapshot, _coords: &dyn CoordinateConverter) {}
    }

    fn fixed(id: &str, x: f64, y: f64, w: f64, h: f64) -> Arc<dyn InteractorDescriptor> {
        Arc::new(Fixed {
            id: id.to_string(),
            rect: Rect::new(x, y, w, h),
        })
    }

    fn ids(found: Vec<Arc<dyn InteractorDescriptor>>) -> Vec<String> {
        let mut ids: Vec<_> = found.iter().map(|d| d.id().to_string()).collect();
        ids.sort();
        ids
    }

    #[test]
    fn add_find_remove() {
        let mut cache = StandardInteractorCache::new(Rect::new(0.0, 0.0, 200.0, 400.0));
        cache.add(fixed("a", 0.0, 0.0, 50.0, 50.0));
        cache.add(fixed("b", 100.0, 300.0, 50.0, 50.0));

        assert_eq!(ids(cache.find(&Rect::new(0.0, 0.0, 60.0, 60.0))), vec!["a"]);
        assert!(cache.get("b").is_some());

        assert!(cache.remove("a").is_some());
        assert!(cache.remove("a").is_none());
        assert!(cache.find(&Rect::new(0.0, 0.0, 60.0, 60.0)).is_empty());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn set_bounds_reindexes_everything() {
        let mut cache = StandardInteractorCache::new(Rect::new(0.0, 0.0, 200.0, 400.0));
        cache.add(fixed("a", 0.0, 0.0, 50.0, 50.0));
        cache.add(fixed("far", 900.0, 900.0, 50.0, 50.0));

        cache.set_bounds(Rect::new(0.0, 0.0, 1000.0, 1000.0));

        assert_eq!(cache.bounds(), Rect::new(0.0, 0.0, 1000.0, 1000.0));
        assert_eq!(cache.len(), 2);
        assert_eq!(ids(cache.find(&Rect::new(920.0, 920.0, 5.0, 5.0))), vec!["far"]);
        assert!(cache.remove("a").is_some());
    }

    #[test]
    fn test_count_reflects_pruning() {
        let mut cache = StandardInteractorCache::new(Rect::new(0.0, 0.0, 200.0, 400.0));
        for i in 0..4 {
            cache.add(fixed(&format!("top{i}"), 0.0, f64::from(i) * 10.0, 20.0, 5.0));
            cache.add(fixed(&format!("bottom{i}"), 0.0, 300.0 + f64::from(i) * 10.0, 20.0, 5.0));
        }
        let (matches, tested) = cache.find_with_count(&Rect::new(0.0, 0.0, 50.0, 50.0));
        assert_eq!(matches.len(), 4);
        assert_eq!(tested, 4);
    }
}
