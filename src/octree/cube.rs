//! Bounding volumes
//!
//! `Bounds` accumulates a min/max box while scanning sources; `Cube`
//! is the axis-aligned cubic volume the octree is built over.

use glam::Vec3;

use crate::octree::point::Point;

/// Padding added to the fitted global cube so points lying exactly on
/// the max faces partition strictly inside it.
const CUBE_FIT_EPSILON: f32 = 0.01;

/// Axis-aligned cubic bounding volume.
///
/// `half_size` is half the edge length, so the cube spans
/// `center - half_size ..= center + half_size` on every axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cube {
    pub center: Vec3,
    pub half_size: f32,
}

impl Cube {
    pub fn new(center: Vec3, half_size: f32) -> Self {
        Self { center, half_size }
    }

    /// True if the point lies inside this cube. The min faces are
    /// exclusive to match the partitioner's tie-break: a point exactly
    /// on a splitting plane belongs to the lesser side, where the
    /// plane is the child's max face.
    pub fn contains(&self, p: &Point) -> bool {
        let min = self.center - Vec3::splat(self.half_size);
        let max = self.center + Vec3::splat(self.half_size);
        p.x > min.x
            && p.x <= max.x
            && p.y > min.y
            && p.y <= max.y
            && p.z > min.z
            && p.z <= max.z
    }
}

/// Min/max box accumulated over a point scan.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Vec3,
    pub max: Vec3,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            min: Vec3::splat(f32::MAX),
            max: Vec3::splat(f32::MIN),
        }
    }
}

impl Bounds {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Grow to include a point.
    pub fn extend(&mut self, p: &Point) {
        self.min = self.min.min(Vec3::new(p.x, p.y, p.z));
        self.max = self.max.max(Vec3::new(p.x, p.y, p.z));
    }

    /// Grow to include another box.
    pub fn merge(&mut self, other: &Bounds) {
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
    }

    /// True if no point was ever accumulated.
    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x
    }

    /// Fit the smallest padded cube around this box.
    ///
    /// The half size is half the largest extent plus a small epsilon,
    /// so boundary points fall strictly inside the cube.
    pub fn to_cube(&self) -> Cube {
        let center = (self.min + self.max) * 0.5;
        let extent = self.max - self.min;
        let half_size = extent.x.max(extent.y).max(extent.z) * 0.5 + CUBE_FIT_EPSILON;
        Cube::new(center, half_size)
    }
}
