//! Binary space partitioning tree for rectangle overlap queries.
//!
//! Each node covers a rectangle and splits it in two along its larger
//! dimension, height first, so that tall and narrow page layouts stay
//! shallow. An item descends into the child half that fully contains it and
//! otherwise stays at the current node. Children are created together, the
//! first time an item needs one.
//!
//! Nodes live in an arena and are addressed by [`NodeId`]; `add` returns the
//! node that stored the item so the caller can remove it again without a
//! search.

use eyex_core::Rect;
use indexmap::IndexMap;

/// Smallest cell used by the interactor cache
pub const DEFAULT_MIN_SIZE: f64 = 100.0;

/// Arena index of a tree node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug)]
struct Node<T> {
    bounds: Rect,
    child_rects: Option<[Rect; 2]>,
    children: Option<[NodeId; 2]>,
    items: IndexMap<String, (Rect, T)>,
}

impl<T> Node<T> {
    fn new(bounds: Rect, min_size: f64) -> Self {
        Self {
            bounds,
            child_rects: split(&bounds, min_size),
            children: None,
            items: IndexMap::new(),
        }
    }
}

/// Matches of a [`BspTree::find`] query
#[derive(Debug)]
pub struct Found<'a, T> {
    /// Items whose rectangle overlaps the query
    pub items: Vec<&'a T>,
    /// Number of item rectangles tested
    pub test_count: usize,
}

/// Spatial index over rectangles.
#[derive(Debug)]
pub struct BspTree<T> {
    nodes: Vec<Node<T>>,
    min_size: f64,
    len: usize,
}

impl<T> BspTree<T> {
    /// Create an empty tree over `bounds`
    pub fn new(bounds: Rect, min_size: f64) -> Self {
        Self {
            nodes: vec![Node::new(bounds, min_size)],
            min_size,
            len: 0,
        }
    }

    /// Rectangle covered by the root
    pub fn bounds(&self) -> Rect {
        self.nodes[0].bounds
    }

    /// Smallest cell size
    pub fn min_size(&self) -> f64 {
        self.min_size
    }

    /// Number of stored items
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the tree is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of allocated nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Rectangle covered by `node`
    pub fn node_bounds(&self, node: NodeId) -> Option<Rect> {
        self.nodes.get(node.0).map(|n| n.bounds)
    }

    /// Insert an item and return the node that stores it.
    ///
    /// An item with the same id at the same node is replaced.
    pub fn add(&mut self, id: impl Into<String>, rect: Rect, item: T) -> NodeId {
        let mut current = NodeId(0);
        loop {
            let node = &self.nodes[current.0];
            let slot = node
                .child_rects
                .as_ref()
                .and_then(|rects| rects.iter().position(|r| r.contains(&rect)));
            let Some(slot) = slot else {
                break;
            };
            current = match self.nodes[current.0].children {
                Some(children) => children[slot],
                None => self.create_children(current)[slot],
            };
        }

        if self.nodes[current.0]
            .items
            .insert(id.into(), (rect, item))
            .is_none()
        {
            self.len += 1;
        }
        current
    }

    /// Remove the item `id` from `node`
    pub fn remove(&mut self, node: NodeId, id: &str) -> Option<T> {
        let (_, item) = self.nodes.get_mut(node.0)?.items.swap_remove(id)?;
        self.len -= 1;
        Some(item)
    }

    /// Every item whose rectangle overlaps `rect`.
    ///
    /// Subtrees that cannot overlap `rect` are skipped. Items held by the
    /// root are always tested since they may extend beyond its rectangle.
    pub fn find(&self, rect: &Rect) -> Found<'_, T> {
        let mut found = Found {
            items: Vec::new(),
            test_count: 0,
        };
        let mut stack = vec![NodeId(0)];
        while let Some(id) = stack.pop() {
            let node = &self.nodes[id.0];
            if id.0 != 0 && !node.bounds.overlaps(rect) {
                continue;
            }
            for (item_rect, item) in node.items.values() {
                found.test_count += 1;
                if item_rect.overlaps(rect) {
                    found.items.push(item);
                }
            }
            if let Some([first, second]) = node.children {
                stack.push(second);
                stack.push(first);
            }
        }
        found
    }

    /// Every stored item with its id
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.nodes
            .iter()
            .flat_map(|n| n.items.iter().map(|(id, (_, item))| (id.as_str(), item)))
    }

    fn create_children(&mut self, parent: NodeId) -> [NodeId; 2] {
        let rects = self.nodes[parent.0].child_rects.unwrap_or_default();
        let first = NodeId(self.nodes.len());
        self.nodes.push(Node::new(rects[0], self.min_size));
        let second = NodeId(self.nodes.len());
        self.nodes.push(Node::new(rects[1], self.min_size));
        self.nodes[parent.0].children = Some([first, second]);
        [first, second]
    }
}

fn split(bounds: &Rect, min_size: f64) -> Option<[Rect; 2]> {
    if bounds.height >= bounds.width {
        let half = bounds.height / 2.0;
        (half >= min_size).then(|| {
            [
                Rect::new(bounds.x, bounds.y, bounds.width, half),
                Rect::new(bounds.x, bounds.y + half, bounds.width, half),
            ]
        })
    } else {
        let half = bounds.width / 2.0;
        (half > min_size).then(|| {
            [
                Rect::new(bounds.x, bounds.y, half, bounds.height),
                Rect::new(bounds.x + half, bounds.y, half, bounds.height),
            ]
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ids(found: &Found<'_, &'static str>) -> Vec<&'static str> {
        let mut ids: Vec<_> = found.items.iter().map(|s| **s).collect();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn small_item_is_found_only_where_it_lies() {
        let mut tree = BspTree::new(Rect::new(0.0, 0.0, 200.0, 400.0), DEFAULT_MIN_SIZE);
        tree.add("a", Rect::new(0.0, 0.0, 50.0, 50.0), "a");

        assert_eq!(ids(&tree.find(&Rect::new(0.0, 0.0, 60.0, 60.0))), vec!["a"]);
        assert!(tree.find(&Rect::new(150.0, 350.0, 10.0, 10.0)).items.is_empty());
    }

    #[test]
    fn splits_height_first_then_width() {
        let mut tree = BspTree::new(Rect::new(0.0, 0.0, 400.0, 400.0), DEFAULT_MIN_SIZE);
        let node = tree.add("a", Rect::new(0.0, 0.0, 10.0, 10.0), "a");
        // 400x400 -> 400x200 -> 200x200 -> 200x100, where half the width is no longer above 100
        assert_eq!(tree.node_bounds(node), Some(Rect::new(0.0, 0.0, 200.0, 100.0)));
    }

    #[test]
    fn item_on_half_boundary_goes_to_that_child() {
        let mut tree = BspTree::new(Rect::new(0.0, 0.0, 200.0, 400.0), DEFAULT_MIN_SIZE);
        let node = tree.add("top", Rect::new(0.0, 0.0, 200.0, 200.0), "top");
        assert_ne!(node, NodeId(0));
        assert_eq!(tree.node_bounds(node), Some(Rect::new(0.0, 0.0, 200.0, 200.0)));
    }

    #[test]
    fn straddling_item_stays_at_parent() {
        let mut tree = BspTree::new(Rect::new(0.0, 0.0, 200.0, 400.0), DEFAULT_MIN_SIZE);
        let node = tree.add("mid", Rect::new(0.0, 150.0, 50.0, 100.0), "mid");
        assert_eq!(node, NodeId(0));
        assert_eq!(tree.node_count(), 1);
    }

    #[test]
    fn remove_uses_storing_node() {
        let mut tree = BspTree::new(Rect::new(0.0, 0.0, 200.0, 400.0), DEFAULT_MIN_SIZE);
        let node = tree.add("a", Rect::new(0.0, 0.0, 50.0, 50.0), "a");
        assert_eq!(tree.remove(node, "a"), Some("a"));
        assert_eq!(tree.remove(node, "a"), None);
        assert!(tree.is_empty());
        assert!(tree.find(&Rect::new(0.0, 0.0, 60.0, 60.0)).items.is_empty());
    }

    #[test]
    fn pruned_subtrees_are_not_tested() {
        let mut tree = BspTree::new(Rect::new(0.0, 0.0, 200.0, 400.0), DEFAULT_MIN_SIZE);
        tree.add("top", Rect::new(0.0, 0.0, 50.0, 50.0), "top");
        tree.add("bottom", Rect::new(0.0, 350.0, 50.0, 50.0), "bottom");
        let found = tree.find(&Rect::new(0.0, 0.0, 10.0, 10.0));
        assert_eq!(ids(&found), vec!["top"]);
        assert_eq!(found.test_count, 1);
    }

    #[test]
    fn root_items_outside_bounds_are_still_found() {
        let mut tree = BspTree::new(Rect::new(0.0, 0.0, 200.0, 400.0), DEFAULT_MIN_SIZE);
        tree.add("outside", Rect::new(500.0, 500.0, 10.0, 10.0), "outside");
        let found = tree.find(&Rect::new(505.0, 505.0, 1.0, 1.0));
        assert_eq!(ids(&found), vec!["outside"]);
    }

    fn arb_rect() -> impl Strategy<Value = Rect> {
        (-100.0..900.0f64, -100.0..900.0f64, 0.0..300.0f64, 0.0..300.0f64)
            .prop_map(|(x, y, w, h)| Rect::new(x, y, w, h))
    }

    proptest! {
        #[test]
        fn find_matches_linear_scan(
            items in prop::collection::vec(arb_rect(), 0..40),
            query in arb_rect(),
            min_size in 10.0..150.0f64,
        ) {
            let mut tree = BspTree::new(Rect::new(0.0, 0.0, 800.0, 800.0), min_size);
            for (i, rect) in items.iter().enumerate() {
                tree.add(i.to_string(), *rect, i);
            }

            let mut found: Vec<usize> = tree.find(&query).items.into_iter().copied().collect();
            found.sort_unstable();
            let expected: Vec<usize> = items
                .iter()
                .enumerate()
                .filter(|(_, r)| r.overlaps(&query))
                .map(|(i, _)| i)
                .collect();
            prop_assert_eq!(found, expected);
        }

        #[test]
        fn insertion_order_does_not_change_results(
            items in prop::collection::vec(arb_rect(), 0..30),
            query in arb_rect(),
        ) {
            let mut forward = BspTree::new(Rect::new(0.0, 0.0, 800.0, 800.0), DEFAULT_MIN_SIZE);
            let mut backward = BspTree::new(Rect::new(0.0, 0.0, 800.0, 800.0), DEFAULT_MIN_SIZE);
            for (i, rect) in items.iter().enumerate() {
                forward.add(i.to_string(), *rect, i);
            }
            for (i, rect) in items.iter().enumerate().rev() {
                backward.add(i.to_string(), *rect, i);
            }

            let mut a: Vec<usize> = forward.find(&query).items.into_iter().copied().collect();
            let mut b: Vec<usize> = backward.find(&query).items.into_iter().copied().collect();
            a.sort_unstable();
            b.sort_unstable();
            prop_assert_eq!(a, b);
        }
    }
}
