//! Arena-based Barnes-Hut quadtree for O(n log n) repulsion.
//!
//! The tree is rebuilt from scratch every simulation iteration, so it carries
//! no state between iterations. Nodes live contiguously in a `Vec` and refer
//! to their children by index; the four children of a subdivided node are
//! allocated together, so a node only stores the index of its first child.
//!
//! # Algorithm
//!
//! 1. **Build:** every body is inserted from the root. Each node on the way
//!    down folds the body into its running mass-weighted center of mass.
//!    Leaves hold up to `capacity` bodies, then split into four equal
//!    quadrants and push their bucket one level down.
//! 2. **Force:** for a query point, a node whose `size / distance < theta`
//!    (and which does not contain the query point) is treated as a single
//!    point mass at its center of mass; otherwise its children are visited.
//!    Leaves are summed exactly, skipping the query body itself.
//!
//! `theta = 0` degenerates to the exact O(n²) sum; 0.5 is the usual
//! compromise between speed and accuracy.

use crate::geometry::{Aabb, Vec2, unit_vector};

/// Distances below this are clamped to avoid the 1/d² singularity.
pub const MIN_DISTANCE: f32 = 1e-3;

/// Default bucket size before a leaf subdivides.
pub const DEFAULT_CAPACITY: usize = 10;

/// Default depth limit; coincident bodies stop subdividing here.
pub const DEFAULT_MAX_DEPTH: u32 = 24;

const GOLDEN_ANGLE: f32 = 2.399_963_2;

/// A point mass participating in the repulsion sum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Body {
    /// Caller-defined key (the layout engine uses the node slot).
    pub key: usize,
    pub position: Vec2,
    pub mass: f32,
}

impl Body {
    pub fn new(key: usize, position: Vec2, mass: f32) -> Self {
        Self { key, position, mass }
    }
}

/// A square region of the quadtree.
#[derive(Debug, Clone)]
struct QuadNode {
    bounds: Aabb,
    depth: u32,
    /// Total mass of all bodies below this node.
    mass: f32,
    /// Mass-weighted center of all bodies below this node.
    center_of_mass: Vec2,
    /// Index of the first of four contiguous children; `None` for a leaf.
    first_child: Option<usize>,
    /// Body indices held by a leaf.
    bucket: Vec<u32>,
}

impl QuadNode {
    fn new(bounds: Aabb, depth: u32) -> Self {
        Self {
            bounds,
            depth,
            mass: 0.0,
            center_of_mass: Vec2::zeros(),
            first_child: None,
            bucket: Vec::new(),
        }
    }

    /// Fold a body into the running center of mass.
    #[inline]
    fn accumulate(&mut self, position: Vec2, mass: f32) {
        let total = self.mass + mass;
        if total > 0.0 {
            self.center_of_mass = (self.center_of_mass * self.mass + position * mass) * (1.0 / total);
        }
        self.mass = total;
    }
}

/// Barnes-Hut quadtree over a body snapshot.
#[derive(Debug, Clone)]
pub struct BarnesHutTree {
    nodes: Vec<QuadNode>,
    bodies: Vec<Body>,
    capacity: usize,
    max_depth: u32,
}

impl BarnesHutTree {
    /// Build a tree with the default capacity and depth limit.
    pub fn build(bodies: &[Body]) -> Self {
        Self::build_with(bodies, DEFAULT_CAPACITY, DEFAULT_MAX_DEPTH)
    }

    /// Build a tree over `bodies`.
    ///
    /// The root covers the unit square, grown to a larger square if any body
    /// lies outside it.
    pub fn build_with(bodies: &[Body], capacity: usize, max_depth: u32) -> Self {
        let mut bounds = Aabb::unit();
        for body in bodies {
            bounds.expand_to(body.position);
        }

        let mut tree = Self {
            nodes: Vec::with_capacity(bodies.len() / capacity.max(1) * 2 + 1),
            bodies: bodies.to_vec(),
            capacity: capacity.max(1),
            max_depth,
        };
        tree.nodes.push(QuadNode::new(bounds.to_square(), 0));

        for index in 0..tree.bodies.len() {
            tree.insert_from(0, index as u32);
        }
        tree
    }

    fn insert_from(&mut self, start: usize, body_index: u32) {
        let body = self.bodies[body_index as usize];
        let mut current = start;
        loop {
            let node = &mut self.nodes[current];
            node.accumulate(body.position, body.mass);
            match node.first_child {
                Some(first) => {
                    current = first + node.bounds.quadrant(body.position);
                }
                None => {
                    node.bucket.push(body_index);
                    if node.bucket.len() > self.capacity && node.depth < self.max_depth {
                        self.subdivide(current);
                    }
                    return;
                }
            }
        }
    }

    fn subdivide(&mut self, index: usize) {
        let first = self.nodes.len();
        let bounds = self.nodes[index].bounds;
        let depth = self.nodes[index].depth + 1;
        for quadrant in 0..4 {
            self.nodes.push(QuadNode::new(bounds.quadrant_box(quadrant), depth));
        }

        let bucket = std::mem::take(&mut self.nodes[index].bucket);
        self.nodes[index].first_child = Some(first);
        for body_index in bucket {
            let position = self.bodies[body_index as usize].position;
            self.insert_from(first + bounds.quadrant(position), body_index);
        }
    }

    /// Repulsive force on the body with key `query` at `position`.
    ///
    /// The result is per unit mass of the query body: each contributing mass
    /// `m` at distance `d` adds `strength * m / d²` pointing away from it.
    pub fn calculate_force(&self, query: usize, position: Vec2, theta: f32, strength: f32) -> Vec2 {
        let mut force = Vec2::zeros();
        let mut stack = vec![0usize];

        while let Some(index) = stack.pop() {
            let node = &self.nodes[index];
            if node.mass <= 0.0 {
                continue;
            }

            match node.first_child {
                None => {
                    for &body_index in &node.bucket {
                        let body = &self.bodies[body_index as usize];
                        if body.key == query {
                            continue;
                        }
                        force += pair_repulsion(
                            position - body.position,
                            body.mass,
                            strength,
                            separation_direction(query, body.key),
                        );
                    }
                }
                Some(first) => {
                    let distance = position.metric_distance(&node.center_of_mass);
                    let far_enough = node.bounds.extent() < theta * distance;
                    if far_enough && !node.bounds.contains(position) {
                        force += pair_repulsion(
                            position - node.center_of_mass,
                            node.mass,
                            strength,
                            Vec2::zeros(),
                        );
                    } else {
                        stack.extend(first..first + 4);
                    }
                }
            }
        }

        force
    }

    /// Total mass held by the tree.
    pub fn total_mass(&self) -> f32 {
        self.nodes[0].mass
    }

    /// Center of mass of all bodies.
    pub fn center_of_mass(&self) -> Vec2 {
        self.nodes[0].center_of_mass
    }

    /// Number of arena nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Deepest level reached.
    pub fn depth(&self) -> u32 {
        self.nodes.iter().map(|n| n.depth).max().unwrap_or(0)
    }
}

/// Exact O(n²) repulsion on `bodies[index]` from every other body.
///
/// Same units as [`BarnesHutTree::calculate_force`].
pub fn brute_force_repulsion(bodies: &[Body], index: usize, strength: f32) -> Vec2 {
    let query = bodies[index];
    bodies
        .iter()
        .filter(|other| other.key != query.key)
        .fold(Vec2::zeros(), |acc, other| {
            acc + pair_repulsion(
                query.position - other.position,
                other.mass,
                strength,
                separation_direction(query.key, other.key),
            )
        })
}

/// `strength * mass / d²` along `delta`, with `d` clamped to [`MIN_DISTANCE`].
///
/// `fallback` is the direction used when the two points coincide.
#[inline]
fn pair_repulsion(delta: Vec2, mass: f32, strength: f32, fallback: Vec2) -> Vec2 {
    let distance = delta.norm();
    let direction = if distance > f32::EPSILON {
        delta * (1.0 / distance)
    } else {
        fallback
    };
    let d = distance.max(MIN_DISTANCE);
    direction * (strength * mass / (d * d))
}

/// Deterministic unit direction pushing `a` away from a coincident `b`.
///
/// Antisymmetric in its arguments so coincident pairs separate instead of
/// drifting together.
#[inline]
fn separation_direction(a: usize, b: usize) -> Vec2 {
    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
    let seed = lo.wrapping_mul(31).wrapping_add(hi) as u32;
    let dir = unit_vector(seed as f32 * GOLDEN_ANGLE);
    if a < b { dir } else { -dir }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{UnitSquareExt, canvas_center};
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn random_bodies(count: usize, seed: u64) -> Vec<Body> {
        let mut rng = SmallRng::seed_from_u64(seed);
        (0..count)
            .map(|i| {
                Body::new(
                    i,
                    Vec2::new(rng.gen_range(0.0..1.0), rng.gen_range(0.0..1.0)),
                    rng.gen_range(1.0..3.0),
                )
            })
            .collect()
    }

    #[test]
    fn test_empty_tree() {
        let tree = BarnesHutTree::build(&[]);
        assert_eq!(tree.total_mass(), 0.0);
        assert_eq!(tree.calculate_force(0, canvas_center(), 0.5, 1.0), Vec2::zeros());
    }

    #[test]
    fn test_single_body_feels_nothing() {
        let tree = BarnesHutTree::build(&[Body::new(0, Vec2::new(0.3, 0.3), 2.0)]);
        assert_eq!(tree.calculate_force(0, Vec2::new(0.3, 0.3), 0.5, 1.0), Vec2::zeros());
    }

    #[test]
    fn test_two_bodies_repel_symmetrically() {
        let bodies = [
            Body::new(0, Vec2::new(0.25, 0.5), 1.0),
            Body::new(1, Vec2::new(0.75, 0.5), 1.0),
        ];
        let tree = BarnesHutTree::build(&bodies);

        let f0 = tree.calculate_force(0, bodies[0].position, 0.5, 1.0);
        let f1 = tree.calculate_force(1, bodies[1].position, 0.5, 1.0);

        // Inverse-square: 1 / 0.5² = 4, pointing away from the other body
        assert!((f0.x + 4.0).abs() < 1e-4, "f0 = {f0}");
        assert!((f1.x - 4.0).abs() < 1e-4, "f1 = {f1}");
        assert!(f0.y.abs() < 1e-6);
    }

    #[test]
    fn test_mass_and_center_of_mass() {
        let bodies = [
            Body::new(0, Vec2::new(0.0, 0.0), 1.0),
            Body::new(1, Vec2::new(1.0, 0.0), 3.0),
        ];
        let tree = BarnesHutTree::build(&bodies);

        assert_eq!(tree.total_mass(), 4.0);
        let com = tree.center_of_mass();
        assert!((com.x - 0.75).abs() < 1e-6);
        assert!(com.y.abs() < 1e-6);
    }

    #[test]
    fn test_subdivides_past_capacity() {
        let bodies = random_bodies(50, 7);
        let tree = BarnesHutTree::build_with(&bodies, 4, DEFAULT_MAX_DEPTH);
        assert!(tree.node_count() > 1);
        assert!(tree.depth() >= 1);

        let expected: f32 = bodies.iter().map(|b| b.mass).sum();
        assert!((tree.total_mass() - expected).abs() < 1e-3);
    }

    #[test]
    fn test_coincident_bodies_stop_at_max_depth() {
        let bodies: Vec<_> = (0..20).map(|i| Body::new(i, canvas_center(), 1.0)).collect();
        let tree = BarnesHutTree::build_with(&bodies, 2, 6);
        assert!(tree.depth() <= 6);

        // Coincident bodies still push each other apart with a bounded force
        let f = tree.calculate_force(0, canvas_center(), 0.5, 1e-6);
        assert!(f.is_finite_point());
        assert!(f.norm() > 0.0);
    }

    #[test]
    fn test_near_distance_is_clamped() {
        let bodies = [
            Body::new(0, Vec2::new(0.5, 0.5), 1.0),
            Body::new(1, Vec2::new(0.5 + 1e-6, 0.5), 1.0),
        ];
        let f = brute_force_repulsion(&bodies, 0, 1.0);
        let limit = 1.0 / (MIN_DISTANCE * MIN_DISTANCE);
        assert!(f.norm() <= limit * 1.0001, "force {} exceeds clamp {}", f.norm(), limit);
    }

    #[test]
    fn test_coincident_direction_is_antisymmetric() {
        let a = separation_direction(3, 9);
        let b = separation_direction(9, 3);
        assert!((a + b).norm() < 1e-6);
        assert!((a.norm() - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_small_theta_matches_brute_force() {
        let bodies = random_bodies(300, 42);
        let tree = BarnesHutTree::build(&bodies);

        let mut error = 0.0f64;
        let mut total = 0.0f64;
        for (i, body) in bodies.iter().enumerate() {
            let approx = tree.calculate_force(body.key, body.position, 0.01, 1.0);
            let exact = brute_force_repulsion(&bodies, i, 1.0);
            error += (approx - exact).norm() as f64;
            total += exact.norm() as f64;
        }

        let relative = error / total;
        assert!(relative < 0.01, "relative error {relative} exceeds 1%");
    }

    #[test]
    fn test_default_theta_stays_close() {
        let bodies = random_bodies(300, 11);
        let tree = BarnesHutTree::build(&bodies);

        let mut error = 0.0f64;
        let mut total = 0.0f64;
        for (i, body) in bodies.iter().enumerate() {
            let approx = tree.calculate_force(body.key, body.position, 0.5, 1.0);
            let exact = brute_force_repulsion(&bodies, i, 1.0);
            error += (approx - exact).norm() as f64;
            total += exact.norm() as f64;
        }

        assert!(error / total < 0.1, "relative error {} too large", error / total);
    }
}
