//! Host-facing orchestration of layout and spatial indexing.
//!
//! A [`LayoutSession`] owns one layout engine and both spatial indices. The
//! host feeds it scanner output, runs the layout, and asks for index refreshes
//! on its own clock; queries always go to whichever index is selected.

use std::collections::HashMap;
use std::ops::ControlFlow;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ConfigError;
use crate::geometry::{Aabb, Vec2};
use crate::graph::{LayoutEdge, LayoutGraph, LayoutNode, NodeId};
use crate::layout::{
    ForceDirectedLayout, FsEntry, FsLink, HierarchyPolicy, LayoutConfig, LayoutProgress, LayoutResult,
};
use crate::spatial::{
    BoundingVolumeIndex, BvhConfig, IndexKind, OctreeConfig, RebuildThrottle, SpatialIndex,
    VolumetricIndex,
};

/// Everything a host can configure, in one object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    pub layout: LayoutConfig,
    pub bvh: BvhConfig,
    pub octree: OctreeConfig,
    pub policy: HierarchyPolicy,
    pub index: IndexKind,
}

impl SessionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.layout.validate()?;
        self.bvh.validate()?;
        self.octree.validate()?;
        self.policy.validate()?;
        Ok(())
    }
}

/// Layout engine plus spatial indices over its positions.
pub struct LayoutSession {
    engine: ForceDirectedLayout,
    policy: HierarchyPolicy,
    bvh: BoundingVolumeIndex,
    octree: VolumetricIndex,
    throttle: RebuildThrottle,
    index: IndexKind,
}

impl LayoutSession {
    pub fn new() -> Self {
        let config = SessionConfig::default();
        Self {
            throttle: RebuildThrottle::new(config.bvh.rebuild_interval_ms),
            engine: ForceDirectedLayout::new(),
            policy: config.policy,
            bvh: BoundingVolumeIndex::with_config(config.bvh),
            octree: VolumetricIndex::with_config(config.octree),
            index: config.index,
        }
    }

    /// Create a session from a validated configuration.
    pub fn with_config(config: SessionConfig) -> Result<Self, ConfigError> {
        let mut session = Self::new();
        session.set_config(config)?;
        Ok(session)
    }

    /// The configuration currently in effect.
    pub fn config(&self) -> SessionConfig {
        SessionConfig {
            layout: self.engine.config().clone(),
            bvh: self.bvh.config().clone(),
            octree: self.octree.config().clone(),
            policy: self.policy.clone(),
            index: self.index,
        }
    }

    /// Validate and apply `config`. Nothing changes when validation fails.
    ///
    /// Positions are kept; index structure built under the old limits stays
    /// until the next refresh.
    pub fn set_config(&mut self, config: SessionConfig) -> Result<(), ConfigError> {
        config.validate()?;
        self.engine.set_config(config.layout)?;
        self.throttle.set_interval_ms(config.bvh.rebuild_interval_ms);
        self.bvh.set_config(config.bvh);
        self.octree.set_config(config.octree);
        self.policy = config.policy;
        self.set_index_kind(config.index);
        Ok(())
    }

    pub fn graph(&self) -> &LayoutGraph {
        self.engine.graph()
    }

    // =========================================================================
    // Layout
    // =========================================================================

    /// Lay out a scanned hierarchy from scratch.
    pub fn layout_entries(&mut self, entries: &[FsEntry], links: &[FsLink]) -> LayoutResult {
        self.layout_entries_with_progress(entries, links, |_| ControlFlow::Continue(()))
    }

    pub fn layout_entries_with_progress<F>(
        &mut self,
        entries: &[FsEntry],
        links: &[FsLink],
        observer: F,
    ) -> LayoutResult
    where
        F: FnMut(&LayoutProgress) -> ControlFlow<()>,
    {
        let (nodes, edges) = self.policy.build(entries, links);
        self.layout_with_progress(&nodes, &edges, observer)
    }

    /// Lay out nodes whose masses and strengths are already resolved.
    pub fn layout(&mut self, nodes: &[LayoutNode], edges: &[LayoutEdge]) -> LayoutResult {
        self.layout_with_progress(nodes, edges, |_| ControlFlow::Continue(()))
    }

    pub fn layout_with_progress<F>(
        &mut self,
        nodes: &[LayoutNode],
        edges: &[LayoutEdge],
        observer: F,
    ) -> LayoutResult
    where
        F: FnMut(&LayoutProgress) -> ControlFlow<()>,
    {
        let result = self.engine.layout_with_progress(nodes, edges, observer);
        self.throttle.mark_dirty();
        result
    }

    /// Continue the simulation from its current state.
    pub fn update_layout(&mut self) -> LayoutResult {
        self.update_layout_with_progress(|_| ControlFlow::Continue(()))
    }

    pub fn update_layout_with_progress<F>(&mut self, observer: F) -> LayoutResult
    where
        F: FnMut(&LayoutProgress) -> ControlFlow<()>,
    {
        let result = self.engine.update_layout_with_progress(observer);
        if result.iterations > 0 {
            self.throttle.mark_dirty();
        }
        result
    }

    /// Drop all nodes, edges and index contents. Idempotent.
    pub fn reset(&mut self) {
        self.engine.reset();
        self.bvh.clear();
        self.octree.clear();
        self.throttle.reset();
    }

    pub fn remove_node(&mut self, id: NodeId) -> bool {
        let removed = self.engine.remove_node(id);
        if removed {
            self.throttle.mark_dirty();
        }
        removed
    }

    pub fn set_node_position(&mut self, id: NodeId, position: Vec2) -> bool {
        let moved = self.engine.set_node_position(id, position);
        if moved {
            self.throttle.mark_dirty();
        }
        moved
    }

    pub fn set_pinned(&mut self, id: NodeId, pinned: bool) -> bool {
        self.engine.set_pinned(id, pinned)
    }

    pub fn positions(&self) -> HashMap<NodeId, Vec2> {
        self.engine.positions()
    }

    // =========================================================================
    // Spatial index
    // =========================================================================

    pub fn index_kind(&self) -> IndexKind {
        self.index
    }

    /// Route queries to another index. The newly selected index may be stale
    /// until the next refresh.
    pub fn set_index_kind(&mut self, kind: IndexKind) {
        if kind != self.index {
            debug!(?kind, "spatial index switched");
            self.index = kind;
            self.throttle.mark_dirty();
        }
    }

    /// Rebuild the selected index from current positions if positions changed
    /// and the rebuild interval elapsed, or unconditionally when `force` is set.
    ///
    /// Returns whether a rebuild happened.
    pub fn refresh_index(&mut self, now_ms: f64, force: bool) -> bool {
        if !force && !self.throttle.should_rebuild(now_ms) {
            return false;
        }

        let points = self.engine.graph().points();
        match self.index {
            IndexKind::Bvh => self.bvh.build(&points),
            IndexKind::Octree => {
                self.octree.rebuild(&points);
            }
        }
        self.throttle.record_build(now_ms);
        true
    }

    /// Whether positions changed since the last refresh.
    pub fn index_is_stale(&self) -> bool {
        self.throttle.is_dirty()
    }

    /// The index queries are answered from.
    pub fn active_index(&self) -> &dyn SpatialIndex {
        match self.index {
            IndexKind::Bvh => &self.bvh,
            IndexKind::Octree => &self.octree,
        }
    }

    pub fn bvh(&self) -> &BoundingVolumeIndex {
        &self.bvh
    }

    pub fn octree(&self) -> &VolumetricIndex {
        &self.octree
    }

    /// Ids inside `area`, as of the last refresh.
    pub fn query_rect(&self, area: &Aabb) -> Vec<NodeId> {
        self.active_index().query(area)
    }

    pub fn query_radius(&self, center: Vec2, radius: f32) -> Vec<NodeId> {
        self.active_index().query_radius(center, radius)
    }

    pub fn nearest_neighbors(&self, point: Vec2, k: usize) -> Vec<NodeId> {
        self.active_index().nearest_neighbors(point, k)
    }
}

impl Default for LayoutSession {
    fn default() -> Self {
        Self::new()
    }
}
