//! Bounding volume hierarchy over a position snapshot.
//!
//! Built in one batch from `(id, position)` pairs and immutable until the
//! next `build`. Nodes live in an index-addressed arena; leaves reference a
//! contiguous range of the `leaves` array, so a box query touches
//! O(log n + k) nodes.
//!
//! # Build
//!
//! For a point set: compute its tight bounds. If the depth limit is reached,
//! the set is small enough, or all points coincide, emit a leaf. Otherwise
//! split at the geometric center of the bounds into four quadrants and recurse
//! into each non-empty one. Center splits (rather than median splits) are
//! enough here because the layout already spreads points evenly.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{SpatialIndex, TreeViolation, DEFAULT_KNN_START_RADIUS};
use crate::error::{self, ConfigError};
use crate::geometry::{Aabb, UnitSquareExt, Vec2};
use crate::graph::NodeId;

/// Configuration for the BVH.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BvhConfig {
    /// Depth at which splitting stops regardless of point count (default: 20).
    pub max_depth: u32,
    /// Point count at or below which a node becomes a leaf (default: 8).
    pub leaf_threshold: usize,
    /// Minimum time between debounced rebuilds in milliseconds (default: 5000).
    pub rebuild_interval_ms: f64,
    /// Starting radius for k-nearest searches (default: 1.0).
    pub knn_start_radius: f32,
}

impl Default for BvhConfig {
    fn default() -> Self {
        Self {
            max_depth: 20,
            leaf_threshold: 8,
            rebuild_interval_ms: 5000.0,
            knn_start_radius: DEFAULT_KNN_START_RADIUS,
        }
    }
}

impl BvhConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        error::check_nonzero("leafThreshold", self.leaf_threshold)?;
        error::check_range("maxDepth", self.max_depth as f32, 1.0, 64.0, "1..=64")?;
        if !(self.rebuild_interval_ms.is_finite() && self.rebuild_interval_ms >= 0.0) {
            return Err(ConfigError::OutOfRange {
                field: "rebuildIntervalMs",
                value: self.rebuild_interval_ms,
                expected: "finite and >= 0",
            });
        }
        error::check_positive("knnStartRadius", self.knn_start_radius)?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct BvhNode {
    bounds: Aabb,
    /// Child node indices; only the first `child_count` are meaningful.
    children: [u32; 4],
    child_count: u8,
    /// Range into `leaves` (leaf nodes only).
    leaf_start: u32,
    leaf_len: u32,
}

impl BvhNode {
    #[inline]
    fn is_leaf(&self) -> bool {
        self.child_count == 0
    }

    #[inline]
    fn children(&self) -> &[u32] {
        &self.children[..self.child_count as usize]
    }
}

/// Batch-built 4-way bounding volume hierarchy.
#[derive(Debug, Clone, Default)]
pub struct BoundingVolumeIndex {
    config: BvhConfig,
    nodes: Vec<BvhNode>,
    leaves: Vec<(NodeId, Vec2)>,
    depth: u32,
}

impl BoundingVolumeIndex {
    pub fn new() -> Self {
        Self::with_config(BvhConfig::default())
    }

    pub fn with_config(config: BvhConfig) -> Self {
        Self {
            config,
            nodes: Vec::new(),
            leaves: Vec::new(),
            depth: 0,
        }
    }

    pub fn config(&self) -> &BvhConfig {
        &self.config
    }

    /// Replace the configuration; takes effect at the next `build`.
    pub fn set_config(&mut self, config: BvhConfig) {
        self.config = config;
    }

    /// Rebuild the tree from a position snapshot.
    ///
    /// Points with non-finite coordinates are skipped.
    pub fn build(&mut self, points: &[(NodeId, Vec2)]) {
        self.nodes.clear();
        self.leaves.clear();
        self.depth = 0;

        let mut items: Vec<(NodeId, Vec2)> =
            points.iter().copied().filter(|(_, p)| p.is_finite_point()).collect();
        let skipped = points.len() - items.len();
        if items.is_empty() {
            return;
        }

        self.leaves.reserve(items.len());
        self.build_node(&mut items, 0);

        debug!(
            points = self.leaves.len(),
            skipped,
            nodes = self.nodes.len(),
            depth = self.depth,
            "bvh rebuilt"
        );
    }

    fn build_node(&mut self, items: &mut [(NodeId, Vec2)], depth: u32) -> u32 {
        let bounds = Aabb::from_points(items.iter().map(|(_, p)| *p))
            .unwrap_or_else(|| Aabb::new(Vec2::zeros(), Vec2::zeros()));
        let index = self.nodes.len();
        self.nodes.push(BvhNode {
            bounds,
            children: [0; 4],
            child_count: 0,
            leaf_start: 0,
            leaf_len: 0,
        });
        self.depth = self.depth.max(depth);

        let is_leaf = depth >= self.config.max_depth
            || items.len() <= self.config.leaf_threshold.max(1)
            || bounds.extent() <= 0.0;
        if is_leaf {
            let node = &mut self.nodes[index];
            node.leaf_start = self.leaves.len() as u32;
            node.leaf_len = items.len() as u32;
            self.leaves.extend_from_slice(items);
            return index as u32;
        }

        // Group by quadrant of the bounds' center, then recurse per group.
        items.sort_unstable_by_key(|(_, p)| bounds.quadrant(*p));
        let mut children = [0u32; 4];
        let mut child_count = 0u8;
        let mut rest = items;
        while let Some(&(_, first)) = rest.first() {
            let quadrant = bounds.quadrant(first);
            let split = rest
                .iter()
                .position(|(_, p)| bounds.quadrant(*p) != quadrant)
                .unwrap_or(rest.len());
            let (group, tail) = std::mem::take(&mut rest).split_at_mut(split);
            children[child_count as usize] = self.build_node(group, depth + 1);
            child_count += 1;
            rest = tail;
        }

        let node = &mut self.nodes[index];
        node.children = children;
        node.child_count = child_count;
        index as u32
    }

    /// Number of arena nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Deepest level of the last build.
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Debug check of the structural invariants.
    ///
    /// Verifies that child indices are valid and each node is reached once,
    /// children stay inside their parent's bounds, every internal node has a
    /// non-empty child, every leaf range lies inside the leaves array, and
    /// every leaf point lies inside its leaf's bounds.
    pub fn validate_tree(&self) -> Result<(), TreeViolation> {
        if self.nodes.is_empty() {
            return if self.leaves.is_empty() {
                Ok(())
            } else {
                Err(TreeViolation::CountMismatch {
                    expected: 0,
                    found: self.leaves.len(),
                })
            };
        }

        let mut visited = vec![false; self.nodes.len()];
        visited[0] = true;
        let mut stack = vec![0usize];
        let mut found = 0usize;

        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if node.is_leaf() {
                let start = node.leaf_start as usize;
                let end = start + node.leaf_len as usize;
                if end > self.leaves.len() {
                    return Err(TreeViolation::LeafRangeOutOfBounds {
                        node: index,
                        start,
                        end,
                        len: self.leaves.len(),
                    });
                }
                for &(id, position) in &self.leaves[start..end] {
                    if !node.bounds.contains(position) {
                        return Err(TreeViolation::PointOutsideBounds { node: index, id, position });
                    }
                }
                found += end - start;
                continue;
            }

            let mut non_empty = false;
            for &child in node.children() {
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
                non_empty |= !child_node.is_leaf() || child_node.leaf_len > 0;
                stack.push(child);
            }
            if !non_empty {
                return Err(TreeViolation::EmptyInternalNode { node: index });
            }
        }

        if found != self.leaves.len() {
            return Err(TreeViolation::CountMismatch {
                expected: self.leaves.len(),
                found,
            });
        }
        Ok(())
    }
}

impl SpatialIndex for BoundingVolumeIndex {
    fn for_each_in(&self, area: &Aabb, visit: &mut dyn FnMut(NodeId, Vec2)) {
        if self.nodes.is_empty() {
            return;
        }

        let mut stack = vec![0u32];
        while let Some(index) = stack.pop() {
            let node = &self.nodes[index as usize];
            if !node.bounds.intersects(area) {
                continue;
            }

            if node.is_leaf() {
                let start = node.leaf_start as usize;
                let end = start + node.leaf_len as usize;
                for &(id, p) in &self.leaves[start..end] {
                    if area.contains(p) {
                        visit(id, p);
                    }
                }
            } else {
                stack.extend_from_slice(node.children());
            }
        }
    }

    fn bounds(&self) -> Option<Aabb> {
        self.nodes.first().map(|root| root.bounds)
    }

    fn len(&self) -> usize {
        self.leaves.len()
    }

    fn clear(&mut self) {
        self.nodes.clear();
        self.leaves.clear();
        self.depth = 0;
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

    fn random_points(count: u32, seed: u64) -> Vec<(NodeId, Vec2)> {
        let mut rng = SmallRng::seed_from_u64(seed);
        (0..count)
            .map(|i| (NodeId(i), Vec2::new(rng.gen_range(0.0..=1.0), rng.gen_range(0.0..=1.0))))
            .collect()
    }

    fn brute_force(points: &[(NodeId, Vec2)], area: &Aabb) -> Vec<NodeId> {
        let mut ids: Vec<_> = points
            .iter()
            .filter(|(_, p)| area.contains(*p))
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    #[test]
    fn test_three_point_query() {
        let mut bvh = BoundingVolumeIndex::new();
        bvh.build(&[
            (NodeId(1), Vec2::new(0.1, 0.1)),
            (NodeId(2), Vec2::new(0.9, 0.9)),
            (NodeId(3), Vec2::new(0.5, 0.5)),
        ]);

        let mut found = bvh.query(&Aabb::from_corners(Vec2::new(0.0, 0.0), Vec2::new(0.6, 0.6)));
        found.sort();
        assert_eq!(found, vec![NodeId(1), NodeId(3)]);
    }

    #[test]
    fn test_query_before_build_is_empty() {
        let bvh = BoundingVolumeIndex::new();
        assert!(bvh.query(&Aabb::unit()).is_empty());
        assert!(bvh.bounds().is_none());
        assert!(bvh.validate_tree().is_ok());
    }

    #[test]
    fn test_random_queries_match_brute_force() {
        let points = random_points(2000, 3);
        let mut bvh = BoundingVolumeIndex::new();
        bvh.build(&points);
        assert!(bvh.validate_tree().is_ok());

        let mut rng = SmallRng::seed_from_u64(99);
        for _ in 0..200 {
            let a = Vec2::new(rng.gen_range(-0.1..1.1), rng.gen_range(-0.1..1.1));
            let b = Vec2::new(rng.gen_range(-0.1..1.1), rng.gen_range(-0.1..1.1));
            let area = Aabb::from_corners(a, b);

            let mut found = bvh.query(&area);
            found.sort();
            assert_eq!(found, brute_force(&points, &area));
        }
    }

    #[test]
    fn test_enclosing_query_returns_each_id_once() {
        let points = random_points(500, 8);
        let mut bvh = BoundingVolumeIndex::new();
        bvh.build(&points);

        let mut found = bvh.query(&Aabb::from_corners(Vec2::new(-1.0, -1.0), Vec2::new(2.0, 2.0)));
        found.sort();
        let expected: Vec<_> = (0..500).map(NodeId).collect();
        assert_eq!(found, expected);
    }

    #[test]
    fn test_leaf_threshold_and_depth() {
        let points = random_points(1000, 5);
        let mut bvh = BoundingVolumeIndex::with_config(BvhConfig {
            leaf_threshold: 16,
            ..BvhConfig::default()
        });
        bvh.build(&points);

        assert!(bvh.node_count() > 1);
        assert!(bvh.depth() >= 2);
        assert!(bvh.depth() <= 20);
        assert_eq!(bvh.len(), 1000);
    }

    #[test]
    fn test_coincident_points_form_one_leaf() {
        let points: Vec<_> = (0..50).map(|i| (NodeId(i), Vec2::new(0.3, 0.3))).collect();
        let mut bvh = BoundingVolumeIndex::new();
        bvh.build(&points);

        assert_eq!(bvh.node_count(), 1);
        assert_eq!(bvh.query(&Aabb::around(Vec2::new(0.3, 0.3), 0.01)).len(), 50);
        assert!(bvh.validate_tree().is_ok());
    }

    #[test]
    fn test_max_depth_caps_recursion() {
        // A tight cluster plus one outlier keeps splitting toward the cluster
        let mut points: Vec<_> = (0..40)
            .map(|i| (NodeId(i), Vec2::new(0.1 + i as f32 * 1e-6, 0.1)))
            .collect();
        points.push((NodeId(40), Vec2::new(0.9, 0.9)));

        let mut bvh = BoundingVolumeIndex::with_config(BvhConfig {
            max_depth: 3,
            leaf_threshold: 2,
            ..BvhConfig::default()
        });
        bvh.build(&points);

        assert!(bvh.depth() <= 3);
        assert!(bvh.validate_tree().is_ok());
        assert_eq!(bvh.query(&Aabb::unit()).len(), 41);
    }

    #[test]
    fn test_non_finite_points_skipped() {
        let mut bvh = BoundingVolumeIndex::new();
        bvh.build(&[
            (NodeId(0), Vec2::new(0.2, 0.2)),
            (NodeId(1), Vec2::new(f32::NAN, 0.2)),
        ]);
        assert_eq!(bvh.len(), 1);
        assert_eq!(bvh.query(&Aabb::unit()), vec![NodeId(0)]);
    }

    #[test]
    fn test_rebuild_replaces_contents() {
        let mut bvh = BoundingVolumeIndex::new();
        bvh.build(&[(NodeId(0), Vec2::new(0.2, 0.2))]);
        bvh.build(&[(NodeId(7), Vec2::new(0.8, 0.8))]);

        assert_eq!(bvh.query(&Aabb::unit()), vec![NodeId(7)]);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let mut bvh = BoundingVolumeIndex::new();
        bvh.build(&random_points(100, 1));

        bvh.clear();
        assert!(bvh.is_empty());
        bvh.clear();
        assert!(bvh.is_empty());
        assert!(bvh.query(&Aabb::unit()).is_empty());
    }

    #[test]
    fn test_validate_detects_corruption() {
        let mut bvh = BoundingVolumeIndex::new();
        bvh.build(&random_points(200, 4));
        assert!(bvh.validate_tree().is_ok());

        let leaf = bvh.nodes.iter().position(|n| n.is_leaf()).unwrap();
        bvh.nodes[leaf].leaf_len += 10_000;
        assert!(matches!(
            bvh.validate_tree(),
            Err(TreeViolation::LeafRangeOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_config_validation() {
        assert!(BvhConfig::default().validate().is_ok());
        let bad = BvhConfig {
            leaf_threshold: 0,
            ..BvhConfig::default()
        };
        assert_eq!(bad.validate(), Err(ConfigError::Zero { field: "leafThreshold" }));
    }
}
