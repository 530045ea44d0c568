//! Axis-aligned bounding boxes and the box tree used for candidate
//! filtering.
//!
//! The box tree answers "which triangle boxes of the other mesh overlap
//! this box" without an exhaustive pairwise sweep; it is the broadphase
//! behind couple generation.

use polysect_math::Point3;

/// Axis-aligned bounding box in 3D.
#[derive(Debug, Clone, Copy)]
pub struct Aabb3 {
    /// Minimum corner.
    pub min: Point3,
    /// Maximum corner.
    pub max: Point3,
}

impl Aabb3 {
    /// Create an AABB from min and max corners.
    pub fn new(min: Point3, max: Point3) -> Self {
        Self { min, max }
    }

    /// Create an empty (inverted) AABB suitable for expansion.
    pub fn empty() -> Self {
        Self {
            min: Point3::new(f64::INFINITY, f64::INFINITY, f64::INFINITY),
            max: Point3::new(f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        }
    }

    /// True if no point was ever included.
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x
    }

    /// Expand this AABB to include a point.
    pub fn include_point(&mut self, p: &Point3) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.min.z = self.min.z.min(p.z);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
        self.max.z = self.max.z.max(p.z);
    }

    /// Expand this AABB to include another AABB.
    pub fn include_aabb(&mut self, other: &Aabb3) {
        if !other.is_empty() {
            self.include_point(&other.min);
            self.include_point(&other.max);
        }
    }

    /// Test if two AABBs overlap (touching counts as overlap).
    pub fn overlaps(&self, other: &Aabb3) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
            && self.min.z <= other.max.z
            && self.max.z >= other.min.z
    }

    /// Intersection of two AABBs, or `None` if they do not overlap.
    pub fn intersection(&self, other: &Aabb3) -> Option<Aabb3> {
        if !self.overlaps(other) {
            return None;
        }
        Some(Aabb3::new(
            Point3::new(
                self.min.x.max(other.min.x),
                self.min.y.max(other.min.y),
                self.min.z.max(other.min.z),
            ),
            Point3::new(
                self.max.x.min(other.max.x),
                self.max.y.min(other.max.y),
                self.max.z.min(other.max.z),
            ),
        ))
    }

    /// Expand the AABB by a tolerance in all directions.
    pub fn expand(&mut self, tol: f64) {
        self.min.x -= tol;
        self.min.y -= tol;
        self.min.z -= tol;
        self.max.x += tol;
        self.max.y += tol;
        self.max.z += tol;
    }

    /// Center of the box.
    pub fn center(&self) -> Point3 {
        Point3::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
            (self.min.z + self.max.z) / 2.0,
        )
    }
}

/// A node of the box tree - either a leaf holding item indices or an
/// internal node with two children.
#[derive(Debug, Clone)]
enum BoxNode {
    Leaf { aabb: Aabb3, items: Vec<usize> },
    Internal {
        aabb: Aabb3,
        left: Box<BoxNode>,
        right: Box<BoxNode>,
    },
}

impl BoxNode {
    fn aabb(&self) -> &Aabb3 {
        match self {
            BoxNode::Leaf { aabb, .. } => aabb,
            BoxNode::Internal { aabb, .. } => aabb,
        }
    }
}

/// Spatial partitioning over a set of boxes, queried by box overlap.
#[derive(Debug, Clone)]
pub struct BoxTree {
    root: Option<BoxNode>,
}

const LEAF_SIZE: usize = 8;

impl BoxTree {
    /// Build a tree over `(item index, box)` pairs.
    pub fn build(boxes: &[(usize, Aabb3)]) -> Self {
        let mut entries: Vec<(usize, Aabb3, Point3)> = boxes
            .iter()
            .map(|(idx, aabb)| (*idx, *aabb, aabb.center()))
            .collect();
        let root = if entries.is_empty() {
            None
        } else {
            Some(build_node(&mut entries))
        };
        Self { root }
    }

    /// Collect the indices of all stored boxes overlapping `query`.
    ///
    /// Results come back in deterministic tree order.
    pub fn overlapping(&self, query: &Aabb3, out: &mut Vec<usize>) {
        out.clear();
        if let Some(ref root) = self.root {
            collect_overlaps(root, query, out);
        }
    }

    /// Bounding box of the whole tree, if non-empty.
    pub fn aabb(&self) -> Option<Aabb3> {
        self.root.as_ref().map(|n| *n.aabb())
    }
}

fn collect_overlaps(node: &BoxNode, query: &Aabb3, out: &mut Vec<usize>) {
    match node {
        BoxNode::Leaf { aabb, items } => {
            if aabb.overlaps(query) {
                out.extend(items.iter().copied());
            }
        }
        BoxNode::Internal { aabb, left, right } => {
            if aabb.overlaps(query) {
                collect_overlaps(left, query, out);
                collect_overlaps(right, query, out);
            }
        }
    }
}

/// Build a node recursively, partitioning by centroid along the widest
/// axis.
fn build_node(entries: &mut [(usize, Aabb3, Point3)]) -> BoxNode {
    let mut bounds = Aabb3::empty();
    for (_, aabb, _) in entries.iter() {
        bounds.include_aabb(aabb);
    }

    if entries.len() <= LEAF_SIZE {
        // Leaves keep overlap tests cheap; storing boxes per item would
        // only repeat what the caller already has.
        return BoxNode::Leaf {
            aabb: bounds,
            items: entries.iter().map(|(idx, _, _)| *idx).collect(),
        };
    }

    let extent = [
        bounds.max.x - bounds.min.x,
        bounds.max.y - bounds.min.y,
        bounds.max.z - bounds.min.z,
    ];
    let axis = if extent[0] >= extent[1] && extent[0] >= extent[2] {
        0
    } else if extent[1] >= extent[2] {
        1
    } else {
        2
    };
    let split = match axis {
        0 => (bounds.min.x + bounds.max.x) / 2.0,
        1 => (bounds.min.y + bounds.max.y) / 2.0,
        _ => (bounds.min.z + bounds.max.z) / 2.0,
    };

    let mid = partition(entries, axis, split);

    // Degenerate partition (all centroids on one side): split in half.
    let mid = if mid == 0 || mid == entries.len() {
        entries.len() / 2
    } else {
        mid
    };

    let (left_entries, right_entries) = entries.split_at_mut(mid);
    BoxNode::Internal {
        aabb: bounds,
        left: Box::new(build_node(left_entries)),
        right: Box::new(build_node(right_entries)),
    }
}

/// Partition entries by centroid along an axis; returns the split point.
fn partition(entries: &mut [(usize, Aabb3, Point3)], axis: usize, pos: f64) -> usize {
    let mut left = 0;
    let mut right = entries.len();
    while left < right {
        let c = match axis {
            0 => entries[left].2.x,
            1 => entries[left].2.y,
            _ => entries[left].2.z,
        };
        if c < pos {
            left += 1;
        } else {
            right -= 1;
            entries.swap(left, right);
        }
    }
    left
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aabb_overlap() {
        let a = Aabb3::new(Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 10.0, 10.0));
        let b = Aabb3::new(Point3::new(5.0, 5.0, 5.0), Point3::new(15.0, 15.0, 15.0));
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));

        let c = Aabb3::new(Point3::new(20.0, 20.0, 20.0), Point3::new(30.0, 30.0, 30.0));
        assert!(!a.overlaps(&c));
    }

    #[test]
    fn test_aabb_touching() {
        let a = Aabb3::new(Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 10.0, 10.0));
        let b = Aabb3::new(Point3::new(10.0, 0.0, 0.0), Point3::new(20.0, 10.0, 10.0));
        assert!(a.overlaps(&b)); // touching counts
    }

    #[test]
    fn test_aabb_intersection() {
        let a = Aabb3::new(Point3::new(0.0, 0.0, 0.0), Point3::new(10.0, 10.0, 10.0));
        let b = Aabb3::new(Point3::new(5.0, 5.0, 5.0), Point3::new(15.0, 15.0, 15.0));
        let i = a.intersection(&b).unwrap();
        assert!((i.min.x - 5.0).abs() < 1e-12);
        assert!((i.max.x - 10.0).abs() < 1e-12);

        let c = Aabb3::new(Point3::new(20.0, 0.0, 0.0), Point3::new(30.0, 1.0, 1.0));
        assert!(a.intersection(&c).is_none());
    }

    fn unit_box_at(x: f64, y: f64, z: f64) -> Aabb3 {
        Aabb3::new(Point3::new(x, y, z), Point3::new(x + 1.0, y + 1.0, z + 1.0))
    }

    #[test]
    fn test_tree_matches_brute_force() {
        let mut boxes = Vec::new();
        for i in 0..10 {
            for j in 0..10 {
                let idx = boxes.len();
                boxes.push((idx, unit_box_at(i as f64 * 1.5, j as f64 * 1.5, 0.0)));
            }
        }
        let tree = BoxTree::build(&boxes);

        let query = Aabb3::new(Point3::new(2.0, 2.0, 0.0), Point3::new(6.0, 6.0, 1.0));
        let mut hits = Vec::new();
        tree.overlapping(&query, &mut hits);

        let mut expected: Vec<usize> = boxes
            .iter()
            .filter(|(_, b)| b.overlaps(&query))
            .map(|(i, _)| *i)
            .collect();
        hits.sort_unstable();
        expected.sort_unstable();
        assert_eq!(hits, expected);
        assert!(!hits.is_empty());
    }

    #[test]
    fn test_tree_empty() {
        let tree = BoxTree::build(&[]);
        let mut hits = vec![1, 2, 3];
        tree.overlapping(&unit_box_at(0.0, 0.0, 0.0), &mut hits);
        assert!(hits.is_empty());
        assert!(tree.aabb().is_none());
    }

    #[test]
    fn test_tree_disjoint_query() {
        let boxes: Vec<(usize, Aabb3)> = (0..20)
            .map(|i| (i, unit_box_at(i as f64 * 2.0, 0.0, 0.0)))
            .collect();
        let tree = BoxTree::build(&boxes);
        let mut hits = Vec::new();
        tree.overlapping(&unit_box_at(0.0, 50.0, 0.0), &mut hits);
        assert!(hits.is_empty());
    }
}
