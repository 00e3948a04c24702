//! Point record layout
//!
//! Points are stored on disk exactly as they are laid out in memory:
//! three little-endian f32 coordinates, 12 bytes per record, no
//! padding. Both the intermediate per-node files and the final octree
//! blob use this layout, so batches can be written with a single
//! `bytemuck` cast.

use bytemuck::{Pod, Zeroable};

/// Size in bytes of one serialized point record.
pub const POINT_RECORD_SIZE: u64 = std::mem::size_of::<Point>() as u64;

/// A single point of the cloud. Immutable value type.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct Point {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Point {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Reinterpret a batch of points as raw bytes for file I/O.
pub fn points_as_bytes(points: &[Point]) -> &[u8] {
    bytemuck::cast_slice(points)
}

/// Decode raw file bytes into points. Copies, so the byte buffer may
/// have any alignment; its length must be a multiple of the record
/// size.
pub fn bytes_to_points(bytes: &[u8]) -> Vec<Point> {
    bytemuck::pod_collect_to_vec(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_size_is_twelve_bytes() {
        assert_eq!(POINT_RECORD_SIZE, 12);
    }

    #[test]
    fn test_byte_cast_roundtrip() {
        let points = vec![
            Point::new(1.0, 2.0, 3.0),
            Point::new(-4.5, 0.0, 9.25),
        ];
        let bytes = points_as_bytes(&points);
        assert_eq!(bytes.len(), 24);
        assert_eq!(bytes_to_points(bytes), points);
    }
}
