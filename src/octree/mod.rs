//! Octree data model: points, bounding cubes, nodes, partitioning,
//! sampling, and the hierarchy file format.

pub mod cube;
pub mod hierarchy;
pub mod node;
pub mod partition;
pub mod point;
pub mod sampler;

pub use cube::{Bounds, Cube};
pub use hierarchy::{read_hierarchy, write_hierarchy, HierarchyNode};
pub use node::{point_file, Node};
pub use partition::{child_cube, octant_of};
pub use point::{Point, POINT_RECORD_SIZE};
pub use sampler::InterleavedSampler;
