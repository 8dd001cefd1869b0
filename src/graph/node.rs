//! Node types.
//!
//! A layout node has:
//! - An opaque stable identifier supplied by the scanner
//! - A mass weighting its repulsion and inertia
//! - An optional seed position (e.g. restored from a previous run)
//! - A pinned flag (pinned nodes keep their position during simulation)

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::geometry::Vec2;

/// Stable node identifier.
///
/// The value is chosen by the host (typically the scanner's entry index) and
/// is never interpreted by the layout core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u32);

impl NodeId {
    /// Create a new NodeId from a raw u32.
    #[inline]
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the raw u32 value.
    #[inline]
    pub fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({})", self.0)
    }
}

impl From<u32> for NodeId {
    #[inline]
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl From<NodeId> for u32 {
    #[inline]
    fn from(id: NodeId) -> Self {
        id.0
    }
}

/// A node handed to the layout engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutNode {
    pub id: NodeId,
    /// Mass (> 0). Non-positive or non-finite masses fall back to 1.0.
    #[serde(default = "default_mass")]
    pub mass: f32,
    /// Pinned nodes exert forces but never move.
    #[serde(default)]
    pub pinned: bool,
    /// Starting position. `None` means random placement around the center.
    #[serde(default)]
    pub position: Option<Vec2>,
}

fn default_mass() -> f32 {
    1.0
}

impl LayoutNode {
    /// A free node with the given mass and no seed position.
    pub fn new(id: impl Into<NodeId>, mass: f32) -> Self {
        Self {
            id: id.into(),
            mass,
            pinned: false,
            position: None,
        }
    }

    /// Seed the node at `position`.
    pub fn at(mut self, position: Vec2) -> Self {
        self.position = Some(position);
        self
    }

    /// Mark the node as pinned.
    pub fn pinned(mut self) -> Self {
        self.pinned = true;
        self
    }

    /// The mass the simulation should use.
    #[inline]
    pub fn effective_mass(&self) -> f32 {
        if self.mass.is_finite() && self.mass > 0.0 {
            self.mass
        } else {
            1.0
        }
    }
}

/// Node state flags packed into a single byte.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeState {
    flags: u8,
}

impl NodeState {
    const PINNED: u8 = 0b0000_0001;

    /// Create a new default node state.
    #[inline]
    pub fn new() -> Self {
        Self { flags: 0 }
    }

    /// Check if the node is pinned (excluded from integration).
    #[inline]
    pub fn is_pinned(self) -> bool {
        self.flags & Self::PINNED != 0
    }

    /// Set the pinned state.
    #[inline]
    pub fn set_pinned(&mut self, pinned: bool) {
        if pinned {
            self.flags |= Self::PINNED;
        } else {
            self.flags &= !Self::PINNED;
        }
    }
}
