//! Mass and spring-strength policy for scanned file-system hierarchies.
//!
//! The scanner reports entries (files and directories) and parent→child
//! links. This module turns them into [`LayoutNode`]s and [`LayoutEdge`]s:
//!
//! - directory mass = `2.0 + 0.1 × childCount`
//! - file mass = `1.0 + sizeMB`
//! - link strength × 2 when the parent is a small directory (< 10 children),
//!   × 1.5 when either end is pinned, × 0.5 for symbolic links
//!
//! Links whose endpoints were not reported are dropped here, mirroring what
//! the layout graph does for raw edges.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{self, ConfigError};
use crate::geometry::Vec2;
use crate::graph::{LayoutEdge, LayoutNode, NodeId};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// One entry reported by the directory scanner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FsEntry {
    pub id: NodeId,
    pub is_directory: bool,
    /// File size in bytes (ignored for directories).
    pub size_bytes: u64,
    /// Number of direct children (ignored for files).
    pub child_count: u32,
    pub pinned: bool,
    pub is_symlink: bool,
    /// Position restored from a previous run.
    pub position: Option<Vec2>,
}

impl Default for FsEntry {
    fn default() -> Self {
        Self {
            id: NodeId(0),
            is_directory: false,
            size_bytes: 0,
            child_count: 0,
            pinned: false,
            is_symlink: false,
            position: None,
        }
    }
}

impl FsEntry {
    pub fn file(id: u32, size_bytes: u64) -> Self {
        Self {
            id: NodeId(id),
            size_bytes,
            ..Self::default()
        }
    }

    pub fn directory(id: u32, child_count: u32) -> Self {
        Self {
            id: NodeId(id),
            is_directory: true,
            child_count,
            ..Self::default()
        }
    }
}

/// A parent→child relation reported by the scanner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FsLink {
    pub parent: NodeId,
    pub child: NodeId,
    /// Base strength before policy multipliers.
    #[serde(default = "default_link_strength")]
    pub strength: f32,
    /// The link was reached through a symbolic link.
    #[serde(default)]
    pub is_symlink: bool,
}

fn default_link_strength() -> f32 {
    1.0
}

impl FsLink {
    pub fn new(parent: u32, child: u32) -> Self {
        Self {
            parent: NodeId(parent),
            child: NodeId(child),
            strength: 1.0,
            is_symlink: false,
        }
    }
}

/// Tunable weights for mapping entries to masses and strengths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HierarchyPolicy {
    pub directory_base_mass: f32,
    pub directory_mass_per_child: f32,
    pub file_base_mass: f32,
    pub file_mass_per_mb: f32,
    /// Directories with fewer children than this count as small.
    pub small_directory_children: u32,
    pub small_directory_factor: f32,
    pub pinned_factor: f32,
    pub symlink_factor: f32,
}

impl Default for HierarchyPolicy {
    fn default() -> Self {
        Self {
            directory_base_mass: 2.0,
            directory_mass_per_child: 0.1,
            file_base_mass: 1.0,
            file_mass_per_mb: 1.0,
            small_directory_children: 10,
            small_directory_factor: 2.0,
            pinned_factor: 1.5,
            symlink_factor: 0.5,
        }
    }
}

impl HierarchyPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        error::check_positive("directoryBaseMass", self.directory_base_mass)?;
        error::check_range("directoryMassPerChild", self.directory_mass_per_child, 0.0, f32::MAX, ">= 0")?;
        error::check_positive("fileBaseMass", self.file_base_mass)?;
        error::check_range("fileMassPerMb", self.file_mass_per_mb, 0.0, f32::MAX, ">= 0")?;
        error::check_positive("smallDirectoryFactor", self.small_directory_factor)?;
        error::check_positive("pinnedFactor", self.pinned_factor)?;
        error::check_positive("symlinkFactor", self.symlink_factor)?;
        Ok(())
    }

    /// Mass of a scanned entry.
    pub fn node_mass(&self, entry: &FsEntry) -> f32 {
        if entry.is_directory {
            self.directory_base_mass + self.directory_mass_per_child * entry.child_count as f32
        } else {
            let size_mb = (entry.size_bytes as f64 / BYTES_PER_MB) as f32;
            self.file_base_mass + self.file_mass_per_mb * size_mb
        }
    }

    /// Spring strength of a link given its (already resolved) endpoints.
    pub fn link_strength(&self, link: &FsLink, parent: &FsEntry, child: &FsEntry) -> f32 {
        let mut strength = link.strength;
        if parent.is_directory && parent.child_count < self.small_directory_children {
            strength *= self.small_directory_factor;
        }
        if parent.pinned || child.pinned {
            strength *= self.pinned_factor;
        }
        if link.is_symlink || child.is_symlink {
            strength *= self.symlink_factor;
        }
        strength
    }

    pub fn layout_node(&self, entry: &FsEntry) -> LayoutNode {
        LayoutNode {
            id: entry.id,
            mass: self.node_mass(entry),
            pinned: entry.pinned,
            position: entry.position,
        }
    }

    /// Convert scanner output into layout input.
    ///
    /// Later duplicates of an id are ignored; links with unknown endpoints
    /// are dropped.
    pub fn build(&self, entries: &[FsEntry], links: &[FsLink]) -> (Vec<LayoutNode>, Vec<LayoutEdge>) {
        let mut by_id: HashMap<NodeId, &FsEntry> = HashMap::with_capacity(entries.len());
        let mut nodes = Vec::with_capacity(entries.len());
        for entry in entries {
            if by_id.contains_key(&entry.id) {
                continue;
            }
            by_id.insert(entry.id, entry);
            nodes.push(self.layout_node(entry));
        }

        let mut dropped = 0usize;
        let edges: Vec<LayoutEdge> = links
            .iter()
            .filter_map(|link| {
                let (Some(parent), Some(child)) = (by_id.get(&link.parent), by_id.get(&link.child))
                else {
                    dropped += 1;
                    return None;
                };
                Some(LayoutEdge {
                    source: link.parent,
                    target: link.child,
                    strength: self.link_strength(link, parent, child),
                })
            })
            .collect();

        if dropped > 0 {
            debug!(dropped, "dropped links with unknown endpoints");
        }
        (nodes, edges)
    }
}
