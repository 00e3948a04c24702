//! cloudtree: out-of-core octree construction for massive point clouds.
//!
//! Converts LAS, PTS and raw binary XYZ inputs into a disk-backed
//! multi-resolution octree: one `octree.bin` blob holding every node's
//! point records and one `hierarchy.bin` describing the tree shape.
//! Memory stays bounded regardless of input size; nodes too large to
//! hold in memory are partitioned by streaming them through the output
//! directory.

pub mod build;
pub mod core;
pub mod io;
pub mod octree;
