//! Force-directed layout for file-system hierarchies.
//!
//! This module computes positions in the unit square for a node set joined
//! by parent→child springs. Repulsion is approximated with a Barnes-Hut
//! quadtree; the policy submodule maps scanner entries to masses and spring
//! strengths.

pub mod barnes_hut;
pub mod force;
pub mod policy;

pub use barnes_hut::{BarnesHutTree, Body};
pub use force::{ForceDirectedLayout, LayoutConfig, LayoutProgress, LayoutResult};
pub use policy::{FsEntry, FsLink, HierarchyPolicy};
