//! Spatial indexing for viewport culling and hit testing.
//!
//! Two interchangeable trees answer the same box / radius / k-nearest queries
//! over a snapshot of layout positions:
//!
//! - [`BoundingVolumeIndex`]: 4-way BVH, batch-built from a full snapshot
//! - [`VolumetricIndex`]: 8-way octree, grown one insert at a time
//!
//! Both implement [`SpatialIndex`]. Querying an index that holds nothing
//! returns an empty list, never an error, so per-frame code stays branch-free.

mod bvh;
mod octree;
mod throttle;

pub use bvh::{BoundingVolumeIndex, BvhConfig};
pub use octree::{OctreeConfig, VolumetricIndex};
pub use throttle::RebuildThrottle;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{Aabb, UnitSquareExt, Vec2};
use crate::graph::NodeId;

/// Starting radius of the expanding k-nearest search.
pub const DEFAULT_KNN_START_RADIUS: f32 = 1.0;

/// Which index a host queries through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum IndexKind {
    /// Batch rebuilds; suits snapshots that change wholesale.
    #[default]
    Bvh,
    /// Incremental inserts; suits nodes trickling in.
    Octree,
}

/// Structural defect found by a tree's `validate_tree` check.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TreeViolation {
    #[error("node {node} references child {child} outside the arena")]
    BadChildIndex { node: usize, child: usize },

    #[error("node {child} is reachable more than once (via node {node})")]
    Revisited { node: usize, child: usize },

    #[error("child {child} of node {node} extends past its parent's bounds")]
    ChildOutsideParent { node: usize, child: usize },

    #[error("internal node {node} has no non-empty child")]
    EmptyInternalNode { node: usize },

    #[error("leaf {node} has range {start}..{end} beyond {len} stored points")]
    LeafRangeOutOfBounds {
        node: usize,
        start: usize,
        end: usize,
        len: usize,
    },

    #[error("{id} at {position:?} lies outside the bounds of node {node}")]
    PointOutsideBounds { node: usize, id: NodeId, position: Vec2 },

    #[error("tree holds {found} points but reports {expected}")]
    CountMismatch { expected: usize, found: usize },
}

/// Shared query surface of the spatial indices.
///
/// Implementors provide a box traversal; radius and k-nearest queries are
/// derived from it.
pub trait SpatialIndex {
    /// Call `visit` for every stored point inside `area` (inclusive).
    fn for_each_in(&self, area: &Aabb, visit: &mut dyn FnMut(NodeId, Vec2));

    /// A box containing every stored point, or `None` when empty.
    fn bounds(&self) -> Option<Aabb>;

    /// Number of stored points.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every stored point. Idempotent.
    fn clear(&mut self);

    /// Radius the k-nearest search starts from before doubling.
    fn knn_start_radius(&self) -> f32 {
        DEFAULT_KNN_START_RADIUS
    }

    /// Ids whose position lies inside `area`.
    fn query(&self, area: &Aabb) -> Vec<NodeId> {
        let mut found = Vec::new();
        self.for_each_in(area, &mut |id, _| found.push(id));
        found
    }

    /// Ids within Euclidean distance `radius` of `center`.
    fn query_radius(&self, center: Vec2, radius: f32) -> Vec<NodeId> {
        within_radius(self, center, radius)
            .into_iter()
            .map(|(id, _)| id)
            .collect()
    }

    /// The `k` ids closest to `point`, nearest first.
    ///
    /// The search radius starts at [`knn_start_radius`](Self::knn_start_radius)
    /// and doubles until at least `k` candidates fall inside it or it covers
    /// the whole index; the candidates are then sorted by distance.
    fn nearest_neighbors(&self, point: Vec2, k: usize) -> Vec<NodeId> {
        if k == 0 || !point.is_finite_point() {
            return Vec::new();
        }
        let Some(bounds) = self.bounds() else {
            return Vec::new();
        };

        // Farthest corner: once the radius reaches it every point is a candidate.
        let limit = [
            bounds.min,
            bounds.max,
            Vec2::new(bounds.min.x, bounds.max.y),
            Vec2::new(bounds.max.x, bounds.min.y),
        ]
        .iter()
        .map(|corner| point.metric_distance(corner))
        .fold(0.0f32, f32::max);

        let start = self.knn_start_radius();
        let mut radius = if start.is_finite() && start > 0.0 {
            start
        } else {
            DEFAULT_KNN_START_RADIUS
        };

        loop {
            let mut candidates = within_radius(self, point, radius);
            if candidates.len() >= k || radius >= limit {
                candidates.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
                candidates.truncate(k);
                return candidates.into_iter().map(|(id, _)| id).collect();
            }
            radius *= 2.0;
        }
    }
}

/// `(id, squared distance)` for every point within `radius` of `center`.
fn within_radius<T>(index: &T, center: Vec2, radius: f32) -> Vec<(NodeId, f32)>
where
    T: SpatialIndex + ?Sized,
{
    if !(radius >= 0.0) || !center.is_finite_point() {
        return Vec::new();
    }
    let radius_sq = radius * radius;
    let mut found = Vec::new();
    index.for_each_in(&Aabb::around(center, radius), &mut |id, p| {
        let d_sq = (p - center).norm_squared();
        if d_sq <= radius_sq {
            found.push((id, d_sq));
        }
    });
    found
}
