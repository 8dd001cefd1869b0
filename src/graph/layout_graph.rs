//! LayoutGraph - simulation-owned graph storage.
//!
//! The LayoutGraph stores the hierarchy topology using petgraph's StableGraph
//! and maintains SoA (Structure of Arrays) buffers for positions, velocities
//! and masses so the force loop walks flat slices and positions can be
//! uploaded to the GPU without repacking.

use std::collections::HashMap;

use petgraph::Directed;
use petgraph::stable_graph::{NodeIndex, StableGraph};
use petgraph::visit::{EdgeRef, IntoEdgeReferences};

use super::edge::LayoutEdge;
use super::node::{LayoutNode, NodeId, NodeState};
use crate::geometry::{Aabb, UnitSquareExt, Vec2};

/// Graph storage owned by the layout engine.
///
/// This struct manages:
/// - Graph topology via petgraph (node weight = NodeId, edge weight = strength)
/// - Position/velocity/mass buffers in SoA layout, indexed by slot
/// - Node state (pinned)
/// - ID mapping between host IDs and internal slots
pub struct LayoutGraph {
    /// The underlying graph structure.
    graph: StableGraph<NodeId, f32, Directed>,

    /// Map from host NodeId to petgraph NodeIndex
    node_id_to_index: HashMap<NodeId, NodeIndex>,

    /// X positions (SoA layout)
    pos_x: Vec<f32>,

    /// Y positions (SoA layout)
    pos_y: Vec<f32>,

    /// X velocities (SoA layout)
    vel_x: Vec<f32>,

    /// Y velocities (SoA layout)
    vel_y: Vec<f32>,

    /// Masses (SoA layout)
    mass: Vec<f32>,

    /// Node states (pinned)
    states: Vec<NodeState>,
}

impl LayoutGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::with_capacity(0, 0)
    }

    /// Create a graph with pre-allocated capacity.
    pub fn with_capacity(node_capacity: usize, edge_capacity: usize) -> Self {
        Self {
            graph: StableGraph::with_capacity(node_capacity, edge_capacity),
            node_id_to_index: HashMap::with_capacity(node_capacity),
            pos_x: Vec::with_capacity(node_capacity),
            pos_y: Vec::with_capacity(node_capacity),
            vel_x: Vec::with_capacity(node_capacity),
            vel_y: Vec::with_capacity(node_capacity),
            mass: Vec::with_capacity(node_capacity),
            states: Vec::with_capacity(node_capacity),
        }
    }

    // =========================================================================
    // Node Operations
    // =========================================================================

    /// Add a node at `position`.
    ///
    /// Returns false (and changes nothing) if the id is already present.
    pub fn add_node(&mut self, node: &LayoutNode, position: Vec2) -> bool {
        if self.node_id_to_index.contains_key(&node.id) {
            return false;
        }

        let index = self.graph.add_node(node.id);
        self.node_id_to_index.insert(node.id, index);

        let mut state = NodeState::new();
        state.set_pinned(node.pinned);

        // StableGraph reuses vacated slots, so the buffers may already cover this index.
        let i = index.index();
        if i >= self.pos_x.len() {
            let len = i + 1;
            self.pos_x.resize(len, 0.0);
            self.pos_y.resize(len, 0.0);
            self.vel_x.resize(len, 0.0);
            self.vel_y.resize(len, 0.0);
            self.mass.resize(len, 0.0);
            self.states.resize(len, NodeState::new());
        }
        self.pos_x[i] = position.x;
        self.pos_y[i] = position.y;
        self.vel_x[i] = 0.0;
        self.vel_y[i] = 0.0;
        self.mass[i] = node.effective_mass();
        self.states[i] = state;
        true
    }

    /// Remove a node and all its connected edges.
    pub fn remove_node(&mut self, id: NodeId) -> bool {
        let Some(index) = self.node_id_to_index.remove(&id) else {
            return false;
        };

        // Zero out SoA arrays for the removed node's slot
        let i = index.index();
        self.pos_x[i] = 0.0;
        self.pos_y[i] = 0.0;
        self.vel_x[i] = 0.0;
        self.vel_y[i] = 0.0;
        self.mass[i] = 0.0;
        self.states[i] = NodeState::new();

        self.graph.remove_node(index);
        true
    }

    /// Get the number of nodes.
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Upper bound on slot indices (max slot + 1).
    pub fn node_bound(&self) -> usize {
        self.pos_x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node_id_to_index.contains_key(&id)
    }

    /// Slot of a node in the SoA buffers.
    pub fn slot_of(&self, id: NodeId) -> Option<usize> {
        self.node_id_to_index.get(&id).map(|index| index.index())
    }

    /// Iterate over the slots of live nodes.
    pub fn slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.graph.node_indices().map(|index| index.index())
    }

    /// Iterate over live `(slot, NodeId)` pairs.
    pub fn nodes(&self) -> impl Iterator<Item = (usize, NodeId)> + '_ {
        self.graph
            .node_indices()
            .filter_map(|index| self.graph.node_weight(index).map(|&id| (index.index(), id)))
    }

    #[inline]
    pub fn position(&self, slot: usize) -> Vec2 {
        Vec2::new(self.pos_x[slot], self.pos_y[slot])
    }

    #[inline]
    pub fn set_position(&mut self, slot: usize, p: Vec2) {
        self.pos_x[slot] = p.x;
        self.pos_y[slot] = p.y;
    }

    #[inline]
    pub fn velocity(&self, slot: usize) -> Vec2 {
        Vec2::new(self.vel_x[slot], self.vel_y[slot])
    }

    #[inline]
    pub fn set_velocity(&mut self, slot: usize, v: Vec2) {
        self.vel_x[slot] = v.x;
        self.vel_y[slot] = v.y;
    }

    #[inline]
    pub fn mass(&self, slot: usize) -> f32 {
        self.mass[slot]
    }

    #[inline]
    pub fn state(&self, slot: usize) -> NodeState {
        self.states[slot]
    }

    /// Get a node's position by id.
    pub fn get_node_position(&self, id: NodeId) -> Option<Vec2> {
        self.slot_of(id).map(|slot| self.position(slot))
    }

    /// Move a node, clamping into the unit square, and stop it.
    pub fn set_node_position(&mut self, id: NodeId, p: Vec2) -> bool {
        match self.slot_of(id) {
            Some(slot) => {
                self.set_position(slot, p.clamp_unit());
                self.set_velocity(slot, Vec2::zeros());
                true
            }
            None => false,
        }
    }

    /// Pin or unpin a node.
    pub fn set_pinned(&mut self, id: NodeId, pinned: bool) -> bool {
        match self.slot_of(id) {
            Some(slot) => {
                self.states[slot].set_pinned(pinned);
                if pinned {
                    self.set_velocity(slot, Vec2::zeros());
                }
                true
            }
            None => false,
        }
    }

    // =========================================================================
    // Edge Operations
    // =========================================================================

    /// Add a spring for `edge`.
    ///
    /// Returns false if either endpoint is unknown, the edge is a self-loop,
    /// or the strength is not a positive finite number.
    pub fn add_edge(&mut self, edge: &LayoutEdge) -> bool {
        if edge.source == edge.target || !edge.has_valid_strength() {
            return false;
        }
        let (Some(&source), Some(&target)) = (
            self.node_id_to_index.get(&edge.source),
            self.node_id_to_index.get(&edge.target),
        ) else {
            return false;
        };
        self.graph.add_edge(source, target, edge.strength);
        true
    }

    /// Get the number of edges.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Iterate over springs as `(source_slot, target_slot, strength)`.
    pub fn springs(&self) -> impl Iterator<Item = (usize, usize, f32)> + '_ {
        self.graph
            .edge_references()
            .map(|e| (e.source().index(), e.target().index(), *e.weight()))
    }

    // =========================================================================
    // Buffer Access
    // =========================================================================

    /// Get X positions slice.
    pub fn positions_x(&self) -> &[f32] {
        &self.pos_x
    }

    /// Get Y positions slice.
    pub fn positions_y(&self) -> &[f32] {
        &self.pos_y
    }

    /// Node id per slot, with `u32::MAX` marking vacant slots.
    pub fn slot_ids(&self) -> Vec<u32> {
        let mut ids = vec![u32::MAX; self.node_bound()];
        for (slot, id) in self.nodes() {
            ids[slot] = id.0;
        }
        ids
    }

    // =========================================================================
    // Utilities
    // =========================================================================

    /// Export positions by value as a map.
    pub fn position_map(&self) -> HashMap<NodeId, Vec2> {
        self.nodes()
            .map(|(slot, id)| (id, self.position(slot)))
            .collect()
    }

    /// Snapshot of `(id, position)` pairs for index construction.
    pub fn points(&self) -> Vec<(NodeId, Vec2)> {
        self.nodes().map(|(slot, id)| (id, self.position(slot))).collect()
    }

    /// Get the bounding box of all live nodes.
    pub fn get_bounds(&self) -> Option<Aabb> {
        Aabb::from_points(self.slots().map(|slot| self.position(slot)))
    }

    /// Clear all nodes and edges, resetting the graph to its initial state.
    pub fn clear(&mut self) {
        self.graph.clear();
        self.node_id_to_index.clear();
        self.pos_x.clear();
        self.pos_y.clear();
        self.vel_x.clear();
        self.vel_y.clear();
        self.mass.clear();
        self.states.clear();
    }
}

impl Default for LayoutGraph {
    fn default() -> Self {
        Self::new()
    }
}
