//! Hierarchy file serialization
//!
//! `hierarchy.bin` stores the tree shape only: a depth-first pre-order
//! walk where the root record carries the global cube (center xyz +
//! half size, four f32) and every record carries the point count (u64)
//! and the child mask (u8). Child bounds are not stored; consumers
//! rebuild them from the root cube and the octant indices.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use glam::Vec3;

use crate::core::{Error, Result};
use crate::octree::cube::Cube;
use crate::octree::node::Node;
use crate::octree::partition::child_cube;

/// Serialize the finished tree shape to `path`.
pub fn write_hierarchy(root: &Node, path: &Path) -> Result<()> {
    let file = File::create(path).map_err(|source| Error::OutputOpen {
        path: path.to_path_buf(),
        source,
    })?;
    let mut out = BufWriter::new(file);

    write_cube(&mut out, &root.bounds)?;
    write_node(&mut out, root)?;
    out.flush()?;
    Ok(())
}

fn write_cube<W: Write>(out: &mut W, cube: &Cube) -> Result<()> {
    out.write_all(&cube.center.x.to_le_bytes())?;
    out.write_all(&cube.center.y.to_le_bytes())?;
    out.write_all(&cube.center.z.to_le_bytes())?;
    out.write_all(&cube.half_size.to_le_bytes())?;
    Ok(())
}

fn write_node<W: Write>(out: &mut W, node: &Node) -> Result<()> {
    out.write_all(&node.point_count.to_le_bytes())?;
    out.write_all(&[node.children_mask])?;
    for child in node.children.iter().flatten() {
        write_node(out, child)?;
    }
    Ok(())
}

/// Tree shape read back from a hierarchy file.
#[derive(Debug, Clone)]
pub struct HierarchyNode {
    pub bounds: Cube,
    pub point_count: u64,
    pub children_mask: u8,
    pub children: Vec<HierarchyNode>,
}

impl HierarchyNode {
    /// Sum of point counts over the whole subtree (samples included).
    pub fn total_points(&self) -> u64 {
        self.point_count + self.children.iter().map(|c| c.total_points()).sum::<u64>()
    }

    /// Sum of point counts over leaves only.
    pub fn leaf_points(&self) -> u64 {
        if self.children.is_empty() {
            self.point_count
        } else {
            self.children.iter().map(|c| c.leaf_points()).sum()
        }
    }
}

/// Read a hierarchy file back, reconstructing every node's bounds from
/// the root cube.
pub fn read_hierarchy(path: &Path) -> Result<HierarchyNode> {
    let file = File::open(path).map_err(|source| Error::SourceOpen {
        path: path.to_path_buf(),
        source,
    })?;
    let mut input = BufReader::new(file);

    let center = Vec3::new(read_f32(&mut input)?, read_f32(&mut input)?, read_f32(&mut input)?);
    let bounds = Cube::new(center, read_f32(&mut input)?);
    read_node(&mut input, bounds)
}

fn read_f32<R: Read>(input: &mut R) -> Result<f32> {
    let mut buf = [0u8; 4];
    read_record(input, &mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

fn read_record<R: Read>(input: &mut R, buf: &mut [u8]) -> Result<()> {
    input
        .read_exact(buf)
        .map_err(|_| Error::MalformedSource("truncated hierarchy file".to_string()))
}

fn read_node<R: Read>(input: &mut R, bounds: Cube) -> Result<HierarchyNode> {
    let mut count_buf = [0u8; 8];
    read_record(input, &mut count_buf)?;
    let mut mask_buf = [0u8; 1];
    read_record(input, &mut mask_buf)?;

    let children_mask = mask_buf[0];
    let mut children = Vec::with_capacity(children_mask.count_ones() as usize);
    for i in 0..8u8 {
        if children_mask & (1 << i) != 0 {
            children.push(read_node(input, child_cube(&bounds, i))?);
        }
    }

    Ok(HierarchyNode {
        bounds,
        point_count: u64::from_le_bytes(count_buf),
        children_mask,
        children,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hierarchy_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hierarchy.bin");

        let mut root = Node::new(String::new(), Cube::new(Vec3::new(1.0, 2.0, 3.0), 16.0), 4096);
        root.attach_child(0, 100);
        let five = root.attach_child(5, 2048);
        five.attach_child(7, 900);

        write_hierarchy(&root, &path).unwrap();
        let read = read_hierarchy(&path).unwrap();

        assert_eq!(read.bounds, root.bounds);
        assert_eq!(read.point_count, 4096);
        assert_eq!(read.children_mask, (1 << 0) | (1 << 5));
        assert_eq!(read.children.len(), 2);
        assert_eq!(read.children[0].point_count, 100);
        assert_eq!(read.children[1].children[0].point_count, 900);

        // Child bounds come back from the octant formula, not the file.
        assert_eq!(read.children[1].bounds, child_cube(&root.bounds, 5));
        assert_eq!(
            read.children[1].children[0].bounds,
            child_cube(&child_cube(&root.bounds, 5), 7)
        );
    }

    #[test]
    fn test_truncated_hierarchy_is_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hierarchy.bin");
        std::fs::write(&path, [0u8; 10]).unwrap();

        match read_hierarchy(&path) {
            Err(Error::MalformedSource(_)) => {}
            other => panic!("expected MalformedSource, got {other:?}"),
        }
    }

    #[test]
    fn test_point_accounting_helpers() {
        let mut root = Node::new(String::new(), Cube::new(Vec3::ZERO, 4.0), 10);
        root.attach_child(1, 30);
        root.attach_child(2, 70);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hierarchy.bin");
        write_hierarchy(&root, &path).unwrap();
        let read = read_hierarchy(&path).unwrap();

        assert_eq!(read.total_points(), 110);
        assert_eq!(read.leaf_points(), 100);
    }
}
