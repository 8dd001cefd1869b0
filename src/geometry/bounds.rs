//! Axis-aligned bounding boxes.
//!
//! All containment and intersection tests are inclusive on both edges, so a
//! point lying exactly on a query boundary is reported as inside.

use serde::{Deserialize, Serialize};

use super::Vec2;

/// A 2D axis-aligned box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Aabb {
    pub min: Vec2,
    pub max: Vec2,
}

impl Aabb {
    /// The unit square [0,1]².
    pub fn unit() -> Self {
        Self::new(Vec2::zeros(), Vec2::new(1.0, 1.0))
    }

    #[inline]
    pub const fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    /// Build a box from two arbitrary corners, normalizing their order.
    pub fn from_corners(a: Vec2, b: Vec2) -> Self {
        Self {
            min: Vec2::new(a.x.min(b.x), a.y.min(b.y)),
            max: Vec2::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    /// Square box of half-width `radius` around `center`.
    pub fn around(center: Vec2, radius: f32) -> Self {
        let r = Vec2::new(radius, radius);
        Self {
            min: center - r,
            max: center + r,
        }
    }

    /// Tight bounds of a point set. Returns `None` for an empty set.
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = Vec2>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bounds = Self::new(first, first);
        for p in iter {
            bounds.expand_to(p);
        }
        Some(bounds)
    }

    /// Grow the box so it includes `p`.
    #[inline]
    pub fn expand_to(&mut self, p: Vec2) {
        self.min.x = self.min.x.min(p.x);
        self.min.y = self.min.y.min(p.y);
        self.max.x = self.max.x.max(p.x);
        self.max.y = self.max.y.max(p.y);
    }

    #[inline]
    pub fn center(&self) -> Vec2 {
        Vec2::new((self.min.x + self.max.x) * 0.5, (self.min.y + self.max.y) * 0.5)
    }

    #[inline]
    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    #[inline]
    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }

    /// Length of the longer side.
    #[inline]
    pub fn extent(&self) -> f32 {
        self.width().max(self.height())
    }

    #[inline]
    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }

    /// Whether `other` lies entirely inside this box.
    #[inline]
    pub fn contains_box(&self, other: &Aabb) -> bool {
        self.contains(other.min) && self.contains(other.max)
    }

    #[inline]
    pub fn intersects(&self, other: &Aabb) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    /// Quadrant (0-3) of `p` relative to the box center.
    ///
    /// ```text
    /// +---+---+
    /// | 2 | 3 |
    /// +---+---+
    /// | 0 | 1 |
    /// +---+---+
    /// ```
    #[inline]
    pub fn quadrant(&self, p: Vec2) -> usize {
        let center = self.center();
        let x_bit = (p.x >= center.x) as usize;
        let y_bit = (p.y >= center.y) as usize;
        x_bit | (y_bit << 1)
    }

    /// The sub-box covering `quadrant` (see [`Aabb::quadrant`]).
    pub fn quadrant_box(&self, quadrant: usize) -> Aabb {
        let c = self.center();
        let (min_x, max_x) = if quadrant & 1 != 0 { (c.x, self.max.x) } else { (self.min.x, c.x) };
        let (min_y, max_y) = if quadrant & 2 != 0 { (c.y, self.max.y) } else { (self.min.y, c.y) };
        Aabb::new(Vec2::new(min_x, min_y), Vec2::new(max_x, max_y))
    }

    /// Smallest square with the same center that covers this box.
    pub fn to_square(&self) -> Aabb {
        Aabb::around(self.center(), self.extent() * 0.5)
    }
}

/// A 3D axis-aligned box.
///
/// The volumetric index stores layout points on the `z = 0` plane; the third
/// axis exists so the tree keeps a true octant structure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb3 {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Aabb3 {
    #[inline]
    pub const fn new(min: [f32; 3], max: [f32; 3]) -> Self {
        Self { min, max }
    }

    /// Cube spanning the unit square in x/y and [-0.5, 0.5] in z.
    pub fn unit() -> Self {
        Self::new([0.0, 0.0, -0.5], [1.0, 1.0, 0.5])
    }

    #[inline]
    pub fn center(&self) -> [f32; 3] {
        [
            (self.min[0] + self.max[0]) * 0.5,
            (self.min[1] + self.max[1]) * 0.5,
            (self.min[2] + self.max[2]) * 0.5,
        ]
    }

    #[inline]
    pub fn size(&self) -> [f32; 3] {
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }

    #[inline]
    pub fn contains(&self, p: [f32; 3]) -> bool {
        (0..3).all(|axis| p[axis] >= self.min[axis] && p[axis] <= self.max[axis])
    }

    /// Whether `other` lies entirely inside this box.
    #[inline]
    pub fn contains_box(&self, other: &Aabb3) -> bool {
        self.contains(other.min) && self.contains(other.max)
    }

    /// Intersection test against a 2D box, ignoring the z axis.
    #[inline]
    pub fn intersects_xy(&self, area: &Aabb) -> bool {
        self.min[0] <= area.max.x
            && self.max[0] >= area.min.x
            && self.min[1] <= area.max.y
            && self.max[1] >= area.min.y
    }

    /// Octant (0-7) of `p`: bit 0 = x, bit 1 = y, bit 2 = z.
    #[inline]
    pub fn octant(&self, p: [f32; 3]) -> usize {
        let c = self.center();
        (p[0] >= c[0]) as usize | ((p[1] >= c[1]) as usize) << 1 | ((p[2] >= c[2]) as usize) << 2
    }

    /// The sub-box covering `octant` (see [`Aabb3::octant`]).
    pub fn octant_box(&self, octant: usize) -> Aabb3 {
        let c = self.center();
        let mut min = self.min;
        let mut max = self.max;
        for axis in 0..3 {
            if octant & (1 << axis) != 0 {
                min[axis] = c[axis];
            } else {
                max[axis] = c[axis];
            }
        }
        Aabb3::new(min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_corners_normalizes() {
        let b = Aabb::from_corners(Vec2::new(0.6, 0.1), Vec2::new(0.2, 0.9));
        assert_eq!(b.min, Vec2::new(0.2, 0.1));
        assert_eq!(b.max, Vec2::new(0.6, 0.9));
    }

    #[test]
    fn test_from_points() {
        assert!(Aabb::from_points(std::iter::empty()).is_none());

        let b = Aabb::from_points([Vec2::new(0.1, 0.5), Vec2::new(0.9, 0.2), Vec2::new(0.4, 0.7)])
            .unwrap();
        assert_eq!(b, Aabb::new(Vec2::new(0.1, 0.2), Vec2::new(0.9, 0.7)));
    }

    #[test]
    fn test_contains_is_inclusive() {
        let b = Aabb::new(Vec2::new(0.0, 0.0), Vec2::new(0.5, 0.5));
        assert!(b.contains(Vec2::new(0.5, 0.5)));
        assert!(b.contains(Vec2::new(0.0, 0.25)));
        assert!(!b.contains(Vec2::new(0.50001, 0.25)));
    }

    #[test]
    fn test_intersects() {
        let a = Aabb::new(Vec2::new(0.0, 0.0), Vec2::new(0.5, 0.5));
        let touching = Aabb::new(Vec2::new(0.5, 0.5), Vec2::new(1.0, 1.0));
        let apart = Aabb::new(Vec2::new(0.6, 0.0), Vec2::new(1.0, 0.4));
        assert!(a.intersects(&touching));
        assert!(!a.intersects(&apart));
    }

    #[test]
    fn test_quadrants_tile_the_box() {
        let b = Aabb::unit();
        for q in 0..4 {
            let sub = b.quadrant_box(q);
            assert!(b.contains_box(&sub));
            assert_eq!(b.quadrant(sub.center()), q);
        }
    }

    #[test]
    fn test_octants_tile_the_box() {
        let b = Aabb3::unit();
        for o in 0..8 {
            let sub = b.octant_box(o);
            assert!(b.contains_box(&sub));
            assert_eq!(b.octant(sub.center()), o);
        }
    }
}
