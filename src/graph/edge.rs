//! Edge types.
//!
//! Edges come from parent/child relations in the scanned hierarchy. Each edge
//! carries its source and target node IDs and a spring strength (> 0).

use serde::{Deserialize, Serialize};

use super::NodeId;

/// A directed hierarchy edge handed to the layout engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayoutEdge {
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default = "default_strength")]
    pub strength: f32,
}

fn default_strength() -> f32 {
    1.0
}

impl LayoutEdge {
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>, strength: f32) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            strength,
        }
    }

    /// Whether the strength can drive a spring (finite and positive).
    #[inline]
    pub fn has_valid_strength(&self) -> bool {
        self.strength.is_finite() && self.strength > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_strength() {
        assert!(LayoutEdge::new(0, 1, 1.0).has_valid_strength());
        assert!(!LayoutEdge::new(0, 1, 0.0).has_valid_strength());
        assert!(!LayoutEdge::new(0, 1, -2.0).has_valid_strength());
        assert!(!LayoutEdge::new(0, 1, f32::INFINITY).has_valid_strength());
    }
}
