//! Spatial partitioning
//!
//! The single source of truth for assigning points to octants and
//! deriving child cubes. Every splitting stage (distribution pass,
//! in-core split, streaming split) and every containment check in the
//! tests goes through these two functions.
//!
//! Octant index is a 3-bit code relative to the cube center:
//! bit 2 = x greater, bit 1 = y greater, bit 0 = z greater. Index 7 is
//! right/top/back, index 0 is left/bottom/front when looking along z.

use glam::Vec3;

use crate::octree::cube::Cube;
use crate::octree::point::Point;

/// Assign a point to one of the 8 octants of `cube`.
///
/// Pure and stateless. A coordinate equal to the center is "not
/// greater", so points exactly on a splitting plane go to the lesser
/// side.
#[inline]
pub fn octant_of(cube: &Cube, p: &Point) -> u8 {
    let mut index = 0u8;
    index |= ((p.x > cube.center.x) as u8) << 2;
    index |= ((p.y > cube.center.y) as u8) << 1;
    index |= (p.z > cube.center.z) as u8;
    index
}

/// Cube of child octant `index`: half the half size, center offset by
/// a quarter edge per axis. The 8 children exactly tile the parent.
#[inline]
pub fn child_cube(cube: &Cube, index: u8) -> Cube {
    debug_assert!(index < 8);
    let quarter = cube.half_size * 0.5;
    let offset = Vec3::new(
        if index & 0b100 != 0 { quarter } else { -quarter },
        if index & 0b010 != 0 { quarter } else { -quarter },
        if index & 0b001 != 0 { quarter } else { -quarter },
    );
    Cube::new(cube.center + offset, quarter)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube() -> Cube {
        Cube::new(Vec3::ZERO, 10.0)
    }

    #[test]
    fn test_octant_of_corners() {
        assert_eq!(octant_of(&cube(), &Point::new(5.0, 5.0, 5.0)), 7);
        assert_eq!(octant_of(&cube(), &Point::new(-5.0, -5.0, -5.0)), 0);
        assert_eq!(octant_of(&cube(), &Point::new(5.0, -5.0, 5.0)), 0b101);
        assert_eq!(octant_of(&cube(), &Point::new(-5.0, 5.0, -5.0)), 0b010);
    }

    #[test]
    fn test_points_on_planes_go_to_lesser_side() {
        // Strict `>`: a coordinate equal to the center is "not greater".
        assert_eq!(octant_of(&cube(), &Point::new(0.0, 0.0, 0.0)), 0);
        assert_eq!(octant_of(&cube(), &Point::new(0.0, 1.0, 0.0)), 0b010);
    }

    #[test]
    fn test_octant_assignment_is_idempotent() {
        let p = Point::new(3.25, -9.5, 0.001);
        let first = octant_of(&cube(), &p);
        for _ in 0..10 {
            assert_eq!(octant_of(&cube(), &p), first);
        }
    }

    #[test]
    fn test_children_tile_the_parent() {
        let parent = cube();
        for i in 0..8u8 {
            let child = child_cube(&parent, i);
            assert_eq!(child.half_size, parent.half_size * 0.5);
            // Center offset is a quarter edge on every axis.
            let offset = (child.center - parent.center).abs();
            assert_eq!(offset, Vec3::splat(parent.half_size * 0.5));
        }
        // All 8 child centers are distinct.
        let centers: Vec<Vec3> = (0..8).map(|i| child_cube(&parent, i).center).collect();
        for i in 0..8 {
            for j in (i + 1)..8 {
                assert_ne!(centers[i], centers[j]);
            }
        }
    }

    #[test]
    fn test_assigned_child_contains_the_point() {
        let parent = Cube::new(Vec3::new(4.0, -2.0, 11.0), 16.0);
        let mut k = 0.0f32;
        for _ in 0..200 {
            // Deterministic pseudo-scatter across the parent volume.
            k += 1.618;
            let p = Point::new(
                parent.center.x + (k.sin() * 15.9),
                parent.center.y + ((k * 1.3).cos() * 15.9),
                parent.center.z + ((k * 0.7).sin() * 15.9),
            );
            let index = octant_of(&parent, &p);
            assert!(index < 8);
            assert!(child_cube(&parent, index).contains(&p));
        }
    }
}
