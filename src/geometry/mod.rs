//! Geometry primitives shared by the layout engine and the spatial indices.
//!
//! Positions live in the unit square [0,1]². `Vec2` is nalgebra's planar
//! vector with a few unit-square helpers; `Aabb` and `Aabb3` are the
//! axis-aligned boxes the trees partition space with.

mod bounds;
mod vec2;

pub use bounds::{Aabb, Aabb3};
pub use vec2::{UnitSquareExt, Vec2, canvas_center, unit_vector};
