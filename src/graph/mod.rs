//! Graph data structures owned by the layout engine.
//!
//! Topology lives in petgraph's StableGraph for stable node/edge indices;
//! positions, velocities and masses live in Structure of Arrays (SoA) buffers
//! so the force loop is cache-friendly and positions upload without repacking.

mod edge;
mod layout_graph;
mod node;

pub use edge::LayoutEdge;
pub use layout_graph::LayoutGraph;
pub use node::{LayoutNode, NodeId, NodeState};
