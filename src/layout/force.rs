//! Force-directed layout over the unit square.
//!
//! Connected nodes are pulled toward a target separation by Hooke springs and
//! every pair of nodes repels inverse-square. Repulsion goes through a
//! [`BarnesHutTree`] rebuilt each iteration, or an exact O(n²) sum when
//! Barnes-Hut is disabled.
//!
//! # Iteration
//!
//! 1. Rebuild the quadtree over current positions.
//! 2. Repulsion on node `i`: `repulsion · m_i · Σ m_j / d²` away from each `j`.
//! 3. Attraction per edge: `attraction · strength · (d − springLength)`,
//!    applied equally and oppositely to both endpoints.
//! 4. Integrate `v = (v + F/m) · damping`, move by `v · timeStep` (capped at
//!    `maxDisplacement`) and clamp into [0,1]².
//! 5. Sum kinetic energy `½·m·|v|²`; stop once it drops below `tolerance`
//!    or after `maxIterations`.
//!
//! Every `yieldInterval` iterations control returns to an observer, which
//! may stop the run early. Running out of iterations is not an error: the
//! caller gets best-effort positions and may continue with
//! [`ForceDirectedLayout::update_layout`].

use std::collections::HashMap;
use std::f32::consts::TAU;
use std::ops::ControlFlow;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::barnes_hut::{self, BarnesHutTree, Body};
use crate::error::{self, ConfigError};
use crate::geometry::{UnitSquareExt, Vec2, canvas_center, unit_vector};
use crate::graph::{LayoutEdge, LayoutGraph, LayoutNode, NodeId};

/// Configuration for the force simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LayoutConfig {
    /// Iteration cap for a full `layout` run (default: 500).
    pub max_iterations: u32,
    /// Kinetic energy below which the run counts as converged (default: 0.001).
    pub tolerance: f32,
    /// Inverse-square repulsion constant (default: 0.001).
    pub repulsion_strength: f32,
    /// Spring constant, scaled per edge by its strength (default: 10.0).
    pub attraction_strength: f32,
    /// Rest length of a spring in unit-square units (default: 0.1).
    pub spring_length: f32,
    /// Velocity retained per step, in (0, 1] (default: 0.8).
    pub damping: f32,
    /// Barnes-Hut opening angle (default: 0.5).
    pub theta: f32,
    /// Use the quadtree; false falls back to the exact O(n²) sum.
    pub enable_barnes_hut: bool,
    /// Bodies per quadtree leaf before it subdivides (default: 10).
    pub barnes_hut_capacity: usize,
    /// Quadtree depth limit (default: 24).
    pub barnes_hut_max_depth: u32,
    /// Position change per unit velocity per step (default: 0.01).
    pub time_step: f32,
    /// Largest distance a node may travel in one step (default: 0.05).
    pub max_displacement: f32,
    /// Radius of the disk around the center used for initial placement (default: 0.3).
    pub initial_radius: f32,
    /// Observer cadence in iterations (default: 10).
    pub yield_interval: u32,
    /// Iteration budget for `update_layout` (default: 50).
    pub update_iterations: u32,
    /// Seed for initial placement.
    pub seed: u64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            tolerance: 0.001,
            repulsion_strength: 0.001,
            attraction_strength: 10.0,
            spring_length: 0.1,
            damping: 0.8,
            theta: 0.5,
            enable_barnes_hut: true,
            barnes_hut_capacity: barnes_hut::DEFAULT_CAPACITY,
            barnes_hut_max_depth: barnes_hut::DEFAULT_MAX_DEPTH,
            time_step: 0.01,
            max_displacement: 0.05,
            initial_radius: 0.3,
            yield_interval: 10,
            update_iterations: 50,
            seed: 0x5EED_F00D,
        }
    }
}

impl LayoutConfig {
    /// Reject values that would make the simulation meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        error::check_range("tolerance", self.tolerance, 0.0, f32::MAX, "tolerance >= 0")?;
        error::check_range("repulsionStrength", self.repulsion_strength, 0.0, f32::MAX, "strength >= 0")?;
        error::check_range("attractionStrength", self.attraction_strength, 0.0, f32::MAX, "strength >= 0")?;
        error::check_positive("springLength", self.spring_length)?;
        error::check_positive("damping", self.damping)?;
        error::check_range("damping", self.damping, 0.0, 1.0, "0 < damping <= 1")?;
        error::check_range("theta", self.theta, 0.0, 10.0, "0 <= theta <= 10")?;
        error::check_positive("timeStep", self.time_step)?;
        error::check_positive("maxDisplacement", self.max_displacement)?;
        error::check_range("initialRadius", self.initial_radius, 0.0, 0.5, "0 <= radius <= 0.5")?;
        error::check_nonzero("barnesHutCapacity", self.barnes_hut_capacity)?;
        error::check_nonzero("yieldInterval", self.yield_interval as usize)?;
        Ok(())
    }
}

/// Snapshot handed to the observer at each cooperative yield.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutProgress {
    /// Iterations completed in the current run.
    pub iteration: u32,
    /// Iteration budget of the current run.
    pub max_iterations: u32,
    /// Kinetic energy after the latest iteration.
    pub energy: f32,
}

/// Outcome of a layout run.
#[derive(Debug, Clone, Default)]
pub struct LayoutResult {
    /// Final position per node, inside [0,1]².
    pub positions: HashMap<NodeId, Vec2>,
    /// Iterations executed in this run.
    pub iterations: u32,
    /// Kinetic energy after the last iteration.
    pub energy: f32,
    /// Energy dropped below the tolerance.
    pub converged: bool,
    /// The observer stopped the run.
    pub cancelled: bool,
}

/// Force-directed layout engine.
///
/// Single-owner: all state (positions, velocities, masses, edges) is private
/// and only reachable through whole-operation methods. Hosts that need
/// multi-writer access wrap the engine in their own lock.
pub struct ForceDirectedLayout {
    config: LayoutConfig,
    graph: LayoutGraph,
    rng: SmallRng,
    /// Scratch buffer of accumulated force per slot.
    forces: Vec<Vec2>,
    /// Scratch buffer of bodies for the repulsion pass.
    bodies: Vec<Body>,
}

impl ForceDirectedLayout {
    /// Create an engine with default configuration.
    pub fn new() -> Self {
        Self::from_valid(LayoutConfig::default())
    }

    /// Create an engine, rejecting configurations that fail
    /// [`LayoutConfig::validate`].
    pub fn with_config(config: LayoutConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_valid(config))
    }

    fn from_valid(config: LayoutConfig) -> Self {
        let rng = SmallRng::seed_from_u64(config.seed);
        Self {
            config,
            graph: LayoutGraph::new(),
            rng,
            forces: Vec::new(),
            bodies: Vec::new(),
        }
    }

    pub fn config(&self) -> &LayoutConfig {
        &self.config
    }

    /// Replace the configuration. Current positions are kept; an invalid
    /// configuration leaves the engine untouched.
    pub fn set_config(&mut self, config: LayoutConfig) -> Result<(), ConfigError> {
        config.validate()?;
        debug!(?config, "layout config updated");
        self.config = config;
        Ok(())
    }

    /// The simulated graph.
    pub fn graph(&self) -> &LayoutGraph {
        &self.graph
    }

    // =========================================================================
    // Whole-operation entry points
    // =========================================================================

    /// Lay out `nodes` connected by `edges` from scratch.
    pub fn layout(&mut self, nodes: &[LayoutNode], edges: &[LayoutEdge]) -> LayoutResult {
        self.layout_with_progress(nodes, edges, |_| ControlFlow::Continue(()))
    }

    /// Like [`layout`](Self::layout), reporting to `observer` every
    /// `yield_interval` iterations. Returning `ControlFlow::Break` stops the
    /// run with the positions reached so far.
    pub fn layout_with_progress<F>(
        &mut self,
        nodes: &[LayoutNode],
        edges: &[LayoutEdge],
        observer: F,
    ) -> LayoutResult
    where
        F: FnMut(&LayoutProgress) -> ControlFlow<()>,
    {
        self.load(nodes, edges);
        self.run(self.config.max_iterations, observer)
    }

    /// Run up to `update_iterations` more steps on the current state.
    pub fn update_layout(&mut self) -> LayoutResult {
        self.update_layout_with_progress(|_| ControlFlow::Continue(()))
    }

    pub fn update_layout_with_progress<F>(&mut self, observer: F) -> LayoutResult
    where
        F: FnMut(&LayoutProgress) -> ControlFlow<()>,
    {
        self.run(self.config.update_iterations, observer)
    }

    /// Drop all nodes and edges and reseed placement. Idempotent.
    pub fn reset(&mut self) {
        self.graph.clear();
        self.forces.clear();
        self.bodies.clear();
        self.rng = SmallRng::seed_from_u64(self.config.seed);
    }

    /// Current positions by value.
    pub fn positions(&self) -> HashMap<NodeId, Vec2> {
        self.graph.position_map()
    }

    /// Remove a node and its edges from the running simulation.
    pub fn remove_node(&mut self, id: NodeId) -> bool {
        self.graph.remove_node(id)
    }

    /// Move a node (clamped into the unit square).
    pub fn set_node_position(&mut self, id: NodeId, position: Vec2) -> bool {
        self.graph.set_node_position(id, position)
    }

    /// Pin or unpin a node.
    pub fn set_pinned(&mut self, id: NodeId, pinned: bool) -> bool {
        self.graph.set_pinned(id, pinned)
    }

    // =========================================================================
    // Simulation
    // =========================================================================

    fn load(&mut self, nodes: &[LayoutNode], edges: &[LayoutEdge]) {
        self.reset();
        self.graph = LayoutGraph::with_capacity(nodes.len(), edges.len());

        let mut duplicates = 0usize;
        for node in nodes {
            let position = match node.position {
                Some(seed) => seed.clamp_unit(),
                None => self.random_disk_point(),
            };
            if !self.graph.add_node(node, position) {
                duplicates += 1;
            }
        }

        let mut dropped = 0usize;
        for edge in edges {
            if !self.graph.add_edge(edge) {
                dropped += 1;
            }
        }

        if duplicates > 0 || dropped > 0 {
            debug!(duplicates, dropped, "ignored malformed layout input");
        }
    }

    /// Uniform angle, uniform radius point on a disk around the center.
    fn random_disk_point(&mut self) -> Vec2 {
        let angle = self.rng.gen_range(0.0..TAU);
        let radius = if self.config.initial_radius > 0.0 {
            self.rng.gen_range(0.0..self.config.initial_radius)
        } else {
            0.0
        };
        (canvas_center() + unit_vector(angle) * radius).clamp_unit()
    }

    fn run<F>(&mut self, max_iterations: u32, mut observer: F) -> LayoutResult
    where
        F: FnMut(&LayoutProgress) -> ControlFlow<()>,
    {
        if self.graph.is_empty() {
            return LayoutResult {
                converged: true,
                ..LayoutResult::default()
            };
        }

        debug!(
            nodes = self.graph.node_count(),
            edges = self.graph.edge_count(),
            max_iterations,
            barnes_hut = self.config.enable_barnes_hut,
            "layout run started"
        );

        let yield_interval = self.config.yield_interval.max(1);
        let mut result = LayoutResult::default();

        for iteration in 1..=max_iterations {
            let energy = self.step();
            result.iterations = iteration;
            result.energy = energy;

            if energy < self.config.tolerance {
                result.converged = true;
                break;
            }

            if iteration % yield_interval == 0 {
                trace!(iteration, energy, "layout checkpoint");
                let progress = LayoutProgress {
                    iteration,
                    max_iterations,
                    energy,
                };
                if observer(&progress).is_break() {
                    result.cancelled = true;
                    break;
                }
            }
        }

        debug!(
            iterations = result.iterations,
            energy = result.energy,
            converged = result.converged,
            cancelled = result.cancelled,
            "layout run finished"
        );

        result.positions = self.graph.position_map();
        result
    }

    /// Advance the simulation one iteration and return the kinetic energy.
    pub fn step(&mut self) -> f32 {
        let bound = self.graph.node_bound();
        self.forces.clear();
        self.forces.resize(bound, Vec2::zeros());

        self.bodies.clear();
        self.bodies.extend(
            self.graph
                .slots()
                .map(|slot| Body::new(slot, self.graph.position(slot), self.graph.mass(slot))),
        );

        self.apply_repulsion();
        self.apply_attraction();
        self.integrate()
    }

    fn apply_repulsion(&mut self) {
        let strength = self.config.repulsion_strength;
        if strength == 0.0 {
            return;
        }

        if self.config.enable_barnes_hut {
            let tree = BarnesHutTree::build_with(
                &self.bodies,
                self.config.barnes_hut_capacity,
                self.config.barnes_hut_max_depth,
            );
            for body in &self.bodies {
                let f = tree.calculate_force(body.key, body.position, self.config.theta, strength);
                self.forces[body.key] += (f * body.mass).finite_or_zero();
            }
        } else {
            for (i, body) in self.bodies.iter().enumerate() {
                let f = barnes_hut::brute_force_repulsion(&self.bodies, i, strength);
                self.forces[body.key] += (f * body.mass).finite_or_zero();
            }
        }
    }

    fn apply_attraction(&mut self) {
        let k = self.config.attraction_strength;
        let rest = self.config.spring_length;
        for (source, target, strength) in self.graph.springs() {
            let delta = self.graph.position(target) - self.graph.position(source);
            let distance = delta.norm();
            if distance <= f32::EPSILON {
                continue;
            }
            let pull = delta * (k * strength * (distance - rest) / distance);
            let pull = pull.finite_or_zero();
            self.forces[source] += pull;
            self.forces[target] -= pull;
        }
    }

    fn integrate(&mut self) -> f32 {
        let damping = self.config.damping;
        let dt = self.config.time_step;
        let max_step = self.config.max_displacement;
        let mut energy = 0.0f32;

        let slots: Vec<usize> = self.graph.slots().collect();
        for slot in slots {
            if self.graph.state(slot).is_pinned() {
                self.graph.set_velocity(slot, Vec2::zeros());
                continue;
            }

            let mass = self.graph.mass(slot);
            let velocity = (self.graph.velocity(slot) + self.forces[slot] * (1.0 / mass)) * damping;
            let velocity = velocity.finite_or_zero();

            let old = self.graph.position(slot);
            let new = (old + (velocity * dt).cap_magnitude(max_step)).clamp_unit();
            // Walls and the step cap absorb whatever motion they cut off.
            let velocity = (new - old) * (1.0 / dt);

            self.graph.set_position(slot, new);
            self.graph.set_velocity(slot, velocity);
            energy += 0.5 * mass * velocity.norm_squared();
        }

        energy
    }
}

impl Default for ForceDirectedLayout {
    fn default() -> Self {
        Self::new()
    }
}
