//! Planar vectors for positions, velocities and forces.
//!
//! `Vec2` is nalgebra's `Vector2<f32>`; arithmetic, norms and distances come
//! from there. This module only adds what the unit-square layout needs on top.

use nalgebra::Vector2;

/// A 2D vector in layout space. Serializes as `[x, y]`.
pub type Vec2 = Vector2<f32>;

/// Center of the unit square.
#[inline]
pub fn canvas_center() -> Vec2 {
    Vec2::new(0.5, 0.5)
}

/// Unit vector pointing at `angle` radians.
#[inline]
pub fn unit_vector(angle: f32) -> Vec2 {
    Vec2::new(angle.cos(), angle.sin())
}

/// Layout-space helpers for [`Vec2`].
pub trait UnitSquareExt {
    /// Clamp both components into [0,1]. NaN components map to 0.5.
    fn clamp_unit(self) -> Self;

    /// Replace non-finite components with zero.
    fn finite_or_zero(self) -> Self;

    /// Both components are finite.
    fn is_finite_point(&self) -> bool;
}

#[inline]
fn clamp_component(v: f32) -> f32 {
    if v.is_nan() { 0.5 } else { v.clamp(0.0, 1.0) }
}

#[inline]
fn finite_component(v: f32) -> f32 {
    if v.is_finite() { v } else { 0.0 }
}

impl UnitSquareExt for Vec2 {
    #[inline]
    fn clamp_unit(self) -> Self {
        Vec2::new(clamp_component(self.x), clamp_component(self.y))
    }

    #[inline]
    fn finite_or_zero(self) -> Self {
        Vec2::new(finite_component(self.x), finite_component(self.y))
    }

    #[inline]
    fn is_finite_point(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}
