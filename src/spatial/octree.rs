//! Incrementally built octree.
//!
//! Points are inserted one at a time on the `z = 0` plane of a cube. A leaf
//! splits into eight children once its bucket exceeds `max_nodes_per_leaf`,
//! unless it already sits at `max_depth`. Points outside the root grow the
//! root outward, doubling toward the point, so inserts are never dropped for
//! being off-canvas.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::{SpatialIndex, TreeViolation, DEFAULT_KNN_START_RADIUS};
use crate::error::{self, ConfigError};
use crate::geometry::{Aabb, Aabb3, UnitSquareExt, Vec2};
use crate::graph::NodeId;

/// Doublings allowed for a single out-of-bounds insert before giving up.
const MAX_ROOT_GROWTH: u32 = 128;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OctreeConfig {
    /// Leaves at this depth never split (default: 8).
    pub max_depth: u32,
    /// Bucket size a leaf may reach before splitting (default: 10).
    pub max_nodes_per_leaf: usize,
    /// Starting radius for k-nearest searches (default: 1.0).
    pub knn_start_radius: f32,
}

impl Default for OctreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 8,
            max_nodes_per_leaf: 10,
            knn_start_radius: DEFAULT_KNN_START_RADIUS,
        }
    }
}

impl OctreeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        error::check_nonzero("maxNodesPerLeaf", self.max_nodes_per_leaf)?;
        error::check_range("maxDepth", self.max_depth as f32, 0.0, 32.0, "0..=32")?;
        error::check_positive("knnStartRadius", self.knn_start_radius)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct OctNode {
    bounds: Aabb3,
    children: Option<[u32; 8]>,
    bucket: Vec<(NodeId, Vec2)>,
}

impl OctNode {
    fn leaf(bounds: Aabb3) -> Self {
        Self {
            bounds,
            children: None,
            bucket: Vec::new(),
        }
    }
}

#[inline]
fn lift(p: Vec2) -> [f32; 3] {
    [p.x, p.y, 0.0]
}

/// 8-way spatial index grown by single inserts.
#[derive(Debug, Clone)]
pub struct VolumetricIndex {
    config: OctreeConfig,
    nodes: Vec<OctNode>,
    root: u32,
    ids: HashSet<NodeId>,
    /// Tight bounds of the stored points.
    extent: Option<Aabb>,
}

impl Default for VolumetricIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl VolumetricIndex {
    pub fn new() -> Self {
        Self::with_config(OctreeConfig::default())
    }

    pub fn with_config(config: OctreeConfig) -> Self {
        Self {
            config,
            nodes: Vec::new(),
            root: 0,
            ids: HashSet::new(),
            extent: None,
        }
    }

    pub fn config(&self) -> &OctreeConfig {
        &self.config
    }

    /// Replace the configuration. Existing structure is kept; the new limits
    /// apply to later inserts.
    pub fn set_config(&mut self, config: OctreeConfig) {
        self.config = config;
    }

    /// Insert one point.
    ///
    /// Returns `false` when the position is not finite or `id` is already
    /// stored (use [`rebuild`](Self::rebuild) to move points).
    pub fn insert(&mut self, id: NodeId, position: Vec2) -> bool {
        if !position.is_finite_point() || self.ids.contains(&id) {
            return false;
        }
        if self.nodes.is_empty() {
            self.nodes.push(OctNode::leaf(Aabb3::unit()));
            self.root = 0;
        }

        let point = lift(position);
        let mut growth = 0;
        while !self.nodes[self.root as usize].bounds.contains(point) {
            if growth == MAX_ROOT_GROWTH {
                debug!(%id, ?position, "point unreachable by root growth; dropped");
                return false;
            }
            self.grow_root(point);
            growth += 1;
        }
        if growth > 0 {
            trace!(growth, "octree root grown");
        }

        let mut index = self.root as usize;
        let mut depth = 0;
        while let Some(children) = self.nodes[index].children {
            index = children[self.nodes[index].bounds.octant(point)] as usize;
            depth += 1;
        }

        self.nodes[index].bucket.push((id, position));
        if self.nodes[index].bucket.len() > self.config.max_nodes_per_leaf
            && depth < self.config.max_depth
        {
            self.subdivide(index, depth);
        }

        self.ids.insert(id);
        match self.extent.as_mut() {
            Some(extent) => extent.expand_to(position),
            None => self.extent = Some(Aabb::new(position, position)),
        }
        true
    }

    /// Split the leaf at `depth` into eight children and push its bucket down.
    ///
    /// A child left over capacity keeps splitting until it fits or reaches
    /// `max_depth`.
    fn subdivide(&mut self, index: usize, depth: u32) {
        let bounds = self.nodes[index].bounds;
        let first = self.nodes.len() as u32;
        let mut children = [0u32; 8];
        for (octant, child) in children.iter_mut().enumerate() {
            *child = first + octant as u32;
            self.nodes.push(OctNode::leaf(bounds.octant_box(octant)));
        }

        let bucket = std::mem::take(&mut self.nodes[index].bucket);
        for (id, p) in bucket {
            let child = children[bounds.octant(lift(p))] as usize;
            self.nodes[child].bucket.push((id, p));
        }
        self.nodes[index].children = Some(children);

        if depth + 1 < self.config.max_depth {
            for child in children {
                if self.nodes[child as usize].bucket.len() > self.config.max_nodes_per_leaf {
                    self.subdivide(child as usize, depth + 1);
                }
            }
        }
    }

    /// Double the root toward `point`; the old root becomes one octant.
    fn grow_root(&mut self, point: [f32; 3]) {
        let old = self.nodes[self.root as usize].bounds;
        let size = old.size();
        let mut min = old.min;
        let mut max = old.max;
        let mut old_octant = 0;
        for axis in 0..3 {
            if point[axis] < old.min[axis] {
                min[axis] -= size[axis];
                old_octant |= 1 << axis;
            } else {
                max[axis] += size[axis];
            }
        }
        let grown = Aabb3::new(min, max);

        let root = &mut self.nodes[self.root as usize];
        if root.children.is_none() && root.bucket.is_empty() {
            root.bounds = grown;
            return;
        }

        let first = self.nodes.len() as u32;
        let mut children = [0u32; 8];
        let mut next = first;
        for (octant, child) in children.iter_mut().enumerate() {
            if octant == old_octant {
                *child = self.root;
            } else {
                *child = next;
                next += 1;
                self.nodes.push(OctNode::leaf(grown.octant_box(octant)));
            }
        }

        self.root = self.nodes.len() as u32;
        self.nodes.push(OctNode {
            bounds: grown,
            children: Some(children),
            bucket: Vec::new(),
        });
    }

    /// Replace the contents with a fresh snapshot. Returns the number stored.
    pub fn rebuild(&mut self, points: &[(NodeId, Vec2)]) -> usize {
        self.clear();
        let stored = points.iter().filter(|&&(id, p)| self.insert(id, p)).count();
        debug!(
            points = stored,
            rejected = points.len() - stored,
            nodes = self.nodes.len(),
            depth = self.depth(),
            "octree rebuilt"
        );
        stored
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.ids.contains(&id)
    }

    /// Number of arena nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Bounds of the root cube, if anything was ever inserted.
    pub fn root_bounds(&self) -> Option<Aabb3> {
        self.nodes.get(self.root as usize).map(|n| n.bounds)
    }

    /// Depth of the deepest leaf.
    pub fn depth(&self) -> u32 {
        if self.nodes.is_empty() {
            return 0;
        }
        let mut deepest = 0;
        let mut stack = vec![(self.root, 0u32)];
        while let Some((index, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            if let Some(children) = self.nodes[index as usize].children {
                stack.extend(children.iter().map(|&c| (c, depth + 1)));
            }
        }
        deepest
    }

    /// Debug check of the structural invariants (see
    /// [`BoundingVolumeIndex::validate_tree`](super::BoundingVolumeIndex::validate_tree)).
    pub fn validate_tree(&self) -> Result<(), TreeViolation> {
        if self.nodes.is_empty() {
            return if self.ids.is_empty() {
                Ok(())
            } else {
                Err(TreeViolation::CountMismatch {
                    expected: self.ids.len(),
                    found: 0,
                })
            };
        }

        let root = self.root as usize;
        if root >= self.nodes.len() {
            return Err(TreeViolation::BadChildIndex { node: root, child: root });
        }

        let mut visited = vec![false; self.nodes.len()];
        visited[root] = true;
        let mut stack = vec![root];
        let mut found = 0usize;

        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            let Some(children) = node.children else {
                for &(id, position) in &node.bucket {
                    if !node.bounds.contains(lift(position)) {
                        return Err(TreeViolation::PointOutsideBounds { node: index, id, position });
                    }
                }
                found += node.bucket.len();
                continue;
            };

            let mut non_empty = false;
            for child in children {
                let child = child as usize;
                if child >= self.nodes.len() {
                    return Err(TreeViolation::BadChildIndex { node: index, child });
                }
                if visited[child] {
                    return Err(TreeViolation::Revisited { node: index, child });
                }
                visited[child] = true;

                let child_node = &self.nodes[child];
                if !node.bounds.contains_box(&child_node.bounds) {
                    return Err(TreeViolation::ChildOutsideParent { node: index, child });
                }
                non_empty |= child_node.children.is_some() || !child_node.bucket.is_empty();
                stack.push(child);
            }
            if !non_empty {
                return Err(TreeViolation::EmptyInternalNode { node: index });
            }
        }

        if found != self.ids.len() {
            return Err(TreeViolation::CountMismatch {
                expected: self.ids.len(),
                found,
            });
        }
        Ok(())
    }
}

impl SpatialIndex for VolumetricIndex {
    fn for_each_in(&self, area: &Aabb, visit: &mut dyn FnMut(NodeId, Vec2)) {
        if self.nodes.is_empty() {
            return;
        }

        let mut stack = vec![self.root];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index as usize];
            if !node.bounds.intersects_xy(area) {
                continue;
            }
            match node.children {
                Some(children) => stack.extend_from_slice(&children),
                None => {
                    for &(id, p) in &node.bucket {
                        if area.contains(p) {
                            visit(id, p);
                        }
                    }
                }
            }
        }
    }

    fn bounds(&self) -> Option<Aabb> {
        self.extent
    }

    fn len(&self) -> usize {
        self.ids.len()
    }

    fn clear(&mut self) {
        self.nodes.clear();
        self.root = 0;
        self.ids.clear();
        self.extent = None;
    }

    fn knn_start_radius(&self) -> f32 {
        self.config.knn_start_radius
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn filled(count: u32, seed: u64) -> (VolumetricIndex, Vec<(NodeId, Vec2)>) {
        let mut rng = SmallRng::seed_from_u64(seed);
        let points: Vec<_> = (0..count)
            .map(|i| (NodeId(i), Vec2::new(rng.gen_range(0.0..=1.0), rng.gen_range(0.0..=1.0))))
            .collect();
        let mut octree = VolumetricIndex::new();
        for &(id, p) in &points {
            assert!(octree.insert(id, p));
        }
        (octree, points)
    }

    #[test]
    fn test_lazy_root() {
        let octree = VolumetricIndex::new();
        assert_eq!(octree.node_count(), 0);
        assert!(octree.root_bounds().is_none());
        assert!(octree.validate_tree().is_ok());
    }

    #[test]
    fn test_split_after_capacity() {
        let mut octree = VolumetricIndex::new();
        for i in 0..10 {
            octree.insert(NodeId(i), Vec2::new(0.05 * i as f32 + 0.01, 0.5));
        }
        assert_eq!(octree.node_count(), 1);

        octree.insert(NodeId(10), Vec2::new(0.9, 0.9));
        assert_eq!(octree.node_count(), 9);
        assert_eq!(octree.depth(), 1);
        assert!(octree.validate_tree().is_ok());
    }

    /// `(depth, bucket size)` of every leaf.
    fn leaves(octree: &VolumetricIndex) -> Vec<(u32, usize)> {
        let mut found = Vec::new();
        let mut stack = vec![(octree.root, 0u32)];
        while let Some((index, depth)) = stack.pop() {
            let node = &octree.nodes[index as usize];
            match node.children {
                Some(children) => stack.extend(children.iter().map(|&c| (c, depth + 1))),
                None => found.push((depth, node.bucket.len())),
            }
        }
        found
    }

    #[test]
    fn test_clustered_split_cascades() {
        let mut octree = VolumetricIndex::new();
        // All eleven share an octant for the first two levels
        for i in 0..11 {
            assert!(octree.insert(NodeId(i), Vec2::new(0.01 + 0.02 * i as f32, 0.1)));
        }
        assert!(octree.validate_tree().is_ok());
        assert_eq!(octree.depth(), 3);

        let config = octree.config().clone();
        for (depth, size) in leaves(&octree) {
            if depth < config.max_depth {
                assert!(size <= config.max_nodes_per_leaf, "leaf at depth {depth} holds {size}");
            }
        }
        assert_eq!(octree.query(&Aabb::unit()).len(), 11);
    }

    #[test]
    fn test_random_queries_match_brute_force() {
        let (octree, points) = filled(1500, 21);
        assert!(octree.validate_tree().is_ok());
        assert!(octree.depth() <= 8);

        let mut rng = SmallRng::seed_from_u64(5);
        for _ in 0..200 {
            let a = Vec2::new(rng.gen_range(-0.1..1.1), rng.gen_range(-0.1..1.1));
            let b = Vec2::new(rng.gen_range(-0.1..1.1), rng.gen_range(-0.1..1.1));
            let area = Aabb::from_corners(a, b);

            let mut found = octree.query(&area);
            found.sort();
            let mut expected: Vec<_> = points
                .iter()
                .filter(|(_, p)| area.contains(*p))
                .map(|(id, _)| *id)
                .collect();
            expected.sort();
            assert_eq!(found, expected);
        }
    }

    #[test]
    fn test_enclosing_query_returns_each_id_once() {
        let (octree, _) = filled(400, 2);
        let mut found = octree.query(&Aabb::from_corners(Vec2::new(-5.0, -5.0), Vec2::new(5.0, 5.0)));
        found.sort();
        let expected: Vec<_> = (0..400).map(NodeId).collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_max_depth_stops_splitting() {
        let mut octree = VolumetricIndex::with_config(OctreeConfig {
            max_depth: 2,
            max_nodes_per_leaf: 1,
            ..OctreeConfig::default()
        });
        // Coincident points can never be separated
        for i in 0..30 {
            octree.insert(NodeId(i), Vec2::new(0.25, 0.25));
        }
        assert_eq!(octree.depth(), 2);
        assert_eq!(octree.len(), 30);
        assert!(octree.validate_tree().is_ok());
        assert_eq!(octree.query(&Aabb::around(Vec2::new(0.25, 0.25), 0.0)).len(), 30);
    }

    #[test]
    fn test_out_of_bounds_insert_grows_root() {
        let mut octree = VolumetricIndex::new();
        octree.insert(NodeId(0), Vec2::new(0.5, 0.5));
        assert!(octree.insert(NodeId(1), Vec2::new(-2.5, 3.0)));
        assert!(octree.insert(NodeId(2), Vec2::new(7.0, -1.0)));

        let root = octree.root_bounds().unwrap();
        assert!(root.contains([-2.5, 3.0, 0.0]));
        assert!(root.contains([7.0, -1.0, 0.0]));
        assert!(octree.validate_tree().is_ok());

        let mut found = octree.query(&Aabb::from_corners(Vec2::new(-10.0, -10.0), Vec2::new(10.0, 10.0)));
        found.sort();
        assert_eq!(found, vec![NodeId(0), NodeId(1), NodeId(2)]);
        assert_eq!(octree.bounds(), Some(Aabb::new(Vec2::new(-2.5, -1.0), Vec2::new(7.0, 3.0))));
    }

    #[test]
    fn test_rejects_duplicates_and_non_finite() {
        let mut octree = VolumetricIndex::new();
        assert!(octree.insert(NodeId(1), Vec2::new(0.1, 0.1)));
        assert!(!octree.insert(NodeId(1), Vec2::new(0.9, 0.9)));
        assert!(!octree.insert(NodeId(2), Vec2::new(f32::INFINITY, 0.1)));
        assert_eq!(octree.len(), 1);
        assert!(octree.contains(NodeId(1)));
    }

    #[test]
    fn test_rebuild_moves_points() {
        let mut octree = VolumetricIndex::new();
        octree.insert(NodeId(1), Vec2::new(0.1, 0.1));

        let stored = octree.rebuild(&[(NodeId(1), Vec2::new(0.9, 0.9)), (NodeId(2), Vec2::new(0.2, 0.8))]);
        assert_eq!(stored, 2);
        assert!(octree.query(&Aabb::around(Vec2::new(0.1, 0.1), 0.05)).is_empty());
        assert_eq!(octree.query(&Aabb::around(Vec2::new(0.9, 0.9), 0.05)), vec![NodeId(1)]);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let (mut octree, _) = filled(50, 7);
        octree.clear();
        octree.clear();
        assert!(octree.is_empty());
        assert_eq!(octree.node_count(), 0);
        assert!(octree.query(&Aabb::unit()).is_empty());
    }

    #[test]
    fn test_validate_detects_stray_point() {
        let (mut octree, _) = filled(100, 9);
        let leaf = octree
            .nodes
            .iter()
            .position(|n| n.children.is_none() && !n.bucket.is_empty())
            .unwrap();
        octree.nodes[leaf].bucket[0].1 = Vec2::new(50.0, 50.0);
        assert!(matches!(
            octree.validate_tree(),
            Err(TreeViolation::PointOutsideBounds { .. })
        ));
    }

    #[test]
    fn test_config_validation() {
        assert!(OctreeConfig::default().validate().is_ok());
        let bad = OctreeConfig {
            max_nodes_per_leaf: 0,
            ..OctreeConfig::default()
        };
        assert!(bad.validate().is_err());
    }
}
