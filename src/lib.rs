//! FsGraph - WASM Module
//!
//! Force-directed layout and spatial indexing for file-system hierarchies,
//! compiled to WebAssembly and exposed to JavaScript via wasm-bindgen.
//!
//! # Architecture
//!
//! - `geometry`: 2D vectors and axis-aligned boxes
//! - `graph`: Layout graph on petgraph's StableGraph with SoA position buffers
//! - `layout`: Barnes-Hut force-directed layout and the hierarchy mass policy
//! - `spatial`: BVH and octree indices for viewport and proximity queries
//! - `session`: Layout engine and indices wired together for a host
//!
//! Everything except [`FsGraphWasm`] is plain Rust and tested natively.

use std::ops::ControlFlow;

use js_sys::{Float32Array, Function};
use serde::Serialize;
use wasm_bindgen::prelude::*;

pub mod error;
pub mod geometry;
pub mod graph;
pub mod layout;
pub mod session;
pub mod spatial;

pub use error::ConfigError;
pub use geometry::{Aabb, Vec2};
pub use graph::{LayoutEdge, LayoutNode, NodeId};
pub use layout::{FsEntry, FsLink, HierarchyPolicy, LayoutConfig, LayoutProgress, LayoutResult};
pub use session::{LayoutSession, SessionConfig};
pub use spatial::{IndexKind, SpatialIndex};

/// Initialize the WASM module.
#[wasm_bindgen(start)]
pub fn init() {
    console_error_panic_hook::set_once();
}

/// Position of one node in a [`LayoutSummary`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NodePosition {
    pub id: u32,
    pub x: f32,
    pub y: f32,
}

/// Serializable outcome of a layout run, as handed to JavaScript.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutSummary {
    pub iterations: u32,
    pub energy: f32,
    pub converged: bool,
    pub cancelled: bool,
    /// Sorted by id.
    pub positions: Vec<NodePosition>,
}

impl From<LayoutResult> for LayoutSummary {
    fn from(result: LayoutResult) -> Self {
        let mut positions: Vec<NodePosition> = result
            .positions
            .into_iter()
            .map(|(id, p)| NodePosition { id: id.0, x: p.x, y: p.y })
            .collect();
        positions.sort_by_key(|p| p.id);
        Self {
            iterations: result.iterations,
            energy: result.energy,
            converged: result.converged,
            cancelled: result.cancelled,
            positions,
        }
    }
}

/// Adapt an optional JS callback `(iteration, maxIterations, energy) => boolean`
/// into a layout observer. Returning `false` or throwing stops the run.
fn js_observer(callback: Option<&Function>) -> impl FnMut(&LayoutProgress) -> ControlFlow<()> + '_ {
    move |progress| {
        let Some(callback) = callback else {
            return ControlFlow::Continue(());
        };
        let outcome = callback.call3(
            &JsValue::NULL,
            &JsValue::from(progress.iteration),
            &JsValue::from(progress.max_iterations),
            &JsValue::from(progress.energy),
        );
        match outcome {
            Ok(value) if value.as_bool() == Some(false) => ControlFlow::Break(()),
            Ok(_) => ControlFlow::Continue(()),
            Err(_) => ControlFlow::Break(()),
        }
    }
}

fn summary_to_js(result: LayoutResult) -> Result<JsValue, JsError> {
    Ok(serde_wasm_bindgen::to_value(&LayoutSummary::from(result))?)
}

fn ids_to_u32(ids: Vec<NodeId>) -> Vec<u32> {
    ids.into_iter().map(|id| id.0).collect()
}

/// Main entry point for the layout engine.
///
/// Wraps a [`LayoutSession`] and exposes it to JavaScript.
#[wasm_bindgen]
pub struct FsGraphWasm {
    session: LayoutSession,
}

#[wasm_bindgen]
impl FsGraphWasm {
    /// Create a session with default configuration.
    #[wasm_bindgen(constructor)]
    pub fn new() -> Self {
        Self {
            session: LayoutSession::new(),
        }
    }

    /// Create a session from a (possibly partial) configuration object.
    ///
    /// Missing fields take their defaults; invalid values are rejected.
    #[wasm_bindgen(js_name = withConfig)]
    pub fn with_config(config: JsValue) -> Result<FsGraphWasm, JsError> {
        let config: SessionConfig = serde_wasm_bindgen::from_value(config).map_err(ConfigError::from)?;
        Ok(Self {
            session: LayoutSession::with_config(config)?,
        })
    }

    /// Replace the configuration. Current positions are kept.
    #[wasm_bindgen(js_name = setConfig)]
    pub fn set_config(&mut self, config: JsValue) -> Result<(), JsError> {
        let config: SessionConfig = serde_wasm_bindgen::from_value(config).map_err(ConfigError::from)?;
        self.session.set_config(config)?;
        Ok(())
    }

    /// The configuration in effect, with every field filled in.
    #[wasm_bindgen(js_name = getConfig)]
    pub fn get_config(&self) -> Result<JsValue, JsError> {
        Ok(serde_wasm_bindgen::to_value(&self.session.config())?)
    }

    // =========================================================================
    // Layout
    // =========================================================================

    /// Lay out scanner output from scratch.
    ///
    /// `entries` is an array of `{ id, isDirectory, sizeBytes, childCount,
    /// pinned, isSymlink, position }` and `links` an array of `{ parent,
    /// child, strength, isSymlink }`. The optional `progress` callback is
    /// invoked every `yieldInterval` iterations; returning `false` cancels.
    pub fn layout(
        &mut self,
        entries: JsValue,
        links: JsValue,
        progress: Option<Function>,
    ) -> Result<JsValue, JsError> {
        let entries: Vec<FsEntry> = serde_wasm_bindgen::from_value(entries)?;
        let links: Vec<FsLink> = serde_wasm_bindgen::from_value(links)?;
        let result =
            self.session
                .layout_entries_with_progress(&entries, &links, js_observer(progress.as_ref()));
        summary_to_js(result)
    }

    /// Lay out nodes `{ id, mass, pinned, position }` and edges
    /// `{ source, target, strength }` whose weights are already resolved.
    #[wasm_bindgen(js_name = layoutGraph)]
    pub fn layout_graph(
        &mut self,
        nodes: JsValue,
        edges: JsValue,
        progress: Option<Function>,
    ) -> Result<JsValue, JsError> {
        let nodes: Vec<LayoutNode> = serde_wasm_bindgen::from_value(nodes)?;
        let edges: Vec<LayoutEdge> = serde_wasm_bindgen::from_value(edges)?;
        let result = self
            .session
            .layout_with_progress(&nodes, &edges, js_observer(progress.as_ref()));
        summary_to_js(result)
    }

    /// Continue the simulation for up to `updateIterations` steps.
    #[wasm_bindgen(js_name = updateLayout)]
    pub fn update_layout(&mut self, progress: Option<Function>) -> Result<JsValue, JsError> {
        let result = self
            .session
            .update_layout_with_progress(js_observer(progress.as_ref()));
        summary_to_js(result)
    }

    /// Drop all nodes, edges and index contents.
    pub fn reset(&mut self) {
        self.session.reset();
    }

    // =========================================================================
    // Node Operations
    // =========================================================================

    /// Remove a node and its links.
    ///
    /// Returns true if the node existed and was removed.
    #[wasm_bindgen(js_name = removeNode)]
    pub fn remove_node(&mut self, node_id: u32) -> bool {
        self.session.remove_node(NodeId(node_id))
    }

    /// Get the number of nodes in the layout.
    #[wasm_bindgen(js_name = nodeCount)]
    pub fn node_count(&self) -> u32 {
        self.session.graph().node_count() as u32
    }

    /// Get a node's position as `[x, y]`.
    #[wasm_bindgen(js_name = getNodePosition)]
    pub fn get_node_position(&self, node_id: u32) -> Option<Vec<f32>> {
        self.session
            .graph()
            .get_node_position(NodeId(node_id))
            .map(|p| vec![p.x, p.y])
    }

    /// Move a node (clamped into the unit square).
    #[wasm_bindgen(js_name = setNodePosition)]
    pub fn set_node_position(&mut self, node_id: u32, x: f32, y: f32) -> bool {
        self.session.set_node_position(NodeId(node_id), Vec2::new(x, y))
    }

    /// Pin a node (exclude from integration).
    #[wasm_bindgen(js_name = pinNode)]
    pub fn pin_node(&mut self, node_id: u32) -> bool {
        self.session.set_pinned(NodeId(node_id), true)
    }

    /// Unpin a node.
    #[wasm_bindgen(js_name = unpinNode)]
    pub fn unpin_node(&mut self, node_id: u32) -> bool {
        self.session.set_pinned(NodeId(node_id), false)
    }

    // =========================================================================
    // Position Buffer Access (Zero-Copy)
    // =========================================================================

    /// Get a zero-copy view of X positions, one entry per slot.
    ///
    /// # Safety
    ///
    /// The returned view is invalidated if any Rust allocation occurs.
    /// Use immediately for GPU upload, do not store.
    #[wasm_bindgen(js_name = getPositionsXView)]
    pub fn get_positions_x_view(&self) -> Float32Array {
        unsafe { Float32Array::view(self.session.graph().positions_x()) }
    }

    /// Get a zero-copy view of Y positions, one entry per slot.
    ///
    /// # Safety
    ///
    /// Same constraints as `getPositionsXView`.
    #[wasm_bindgen(js_name = getPositionsYView)]
    pub fn get_positions_y_view(&self) -> Float32Array {
        unsafe { Float32Array::view(self.session.graph().positions_y()) }
    }

    /// Node id per slot, parallel to the position views.
    ///
    /// Vacant slots (left by removed nodes) hold `0xFFFFFFFF`.
    #[wasm_bindgen(js_name = nodeIds)]
    pub fn node_ids(&self) -> Vec<u32> {
        self.session.graph().slot_ids()
    }

    /// Get the length of the position buffers.
    #[wasm_bindgen(js_name = positionsLen)]
    pub fn positions_len(&self) -> usize {
        self.session.graph().positions_x().len()
    }

    /// Get the bounding box of all nodes.
    ///
    /// Returns [min_x, min_y, max_x, max_y], or None if the layout is empty.
    #[wasm_bindgen(js_name = getBounds)]
    pub fn get_bounds(&self) -> Option<Vec<f32>> {
        self.session
            .graph()
            .get_bounds()
            .map(|b| vec![b.min.x, b.min.y, b.max.x, b.max.y])
    }

    // =========================================================================
    // Spatial Queries
    // =========================================================================

    /// Select the index used for queries: `"bvh"` or `"octree"`.
    #[wasm_bindgen(js_name = setIndexKind)]
    pub fn set_index_kind(&mut self, kind: JsValue) -> Result<(), JsError> {
        let kind: IndexKind = serde_wasm_bindgen::from_value(kind).map_err(ConfigError::from)?;
        self.session.set_index_kind(kind);
        Ok(())
    }

    /// Rebuild the selected index if positions changed and the debounce
    /// interval elapsed (or always, with `force`).
    ///
    /// `now_ms` is the host clock, e.g. `performance.now()`. Returns whether
    /// a rebuild happened.
    #[wasm_bindgen(js_name = refreshIndex)]
    pub fn refresh_index(&mut self, now_ms: f64, force: bool) -> bool {
        self.session.refresh_index(now_ms, force)
    }

    /// Find all nodes within a rectangular region.
    ///
    /// Returns a Uint32Array of node IDs.
    #[wasm_bindgen(js_name = queryRect)]
    pub fn query_rect(&self, min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Vec<u32> {
        let area = Aabb::from_corners(Vec2::new(min_x, min_y), Vec2::new(max_x, max_y));
        ids_to_u32(self.session.query_rect(&area))
    }

    /// Find all nodes within `radius` of a point.
    #[wasm_bindgen(js_name = queryRadius)]
    pub fn query_radius(&self, x: f32, y: f32, radius: f32) -> Vec<u32> {
        ids_to_u32(self.session.query_radius(Vec2::new(x, y), radius))
    }

    /// Find the `k` nodes nearest to a point, nearest first.
    #[wasm_bindgen(js_name = nearestNeighbors)]
    pub fn nearest_neighbors(&self, x: f32, y: f32, k: usize) -> Vec<u32> {
        ids_to_u32(self.session.nearest_neighbors(Vec2::new(x, y), k))
    }
}

impl Default for FsGraphWasm {
    fn default() -> Self {
        Self::new()
    }
}
