//! Octree node graph
//!
//! Nodes exclusively own their children, so the tree is a plain
//! recursive ownership structure with no back-pointers. A node's id is
//! its octant path from the root ("" for the root, "27" for child 7 of
//! child 2), which doubles as the key for its intermediate point file.

use std::path::{Path, PathBuf};

use crate::octree::cube::Cube;
use crate::octree::partition::child_cube;
use crate::octree::point::Point;

/// Intermediate point file for a node id, `p{id}` in the output
/// directory. The root's file is just `p`.
pub fn point_file(output_dir: &Path, id: &str) -> PathBuf {
    output_dir.join(format!("p{id}"))
}

/// One node of the octree under construction.
#[derive(Debug)]
pub struct Node {
    /// Octant path from the root; empty for the root itself.
    pub id: String,
    pub bounds: Cube,
    /// Points attributed to this node: a leaf's true count, or the
    /// sample size once the node has been split and sampled.
    pub point_count: u64,
    /// Offset of this node's records in the octree blob. Assigned
    /// exactly once, when the writer reserves the node's range.
    pub byte_offset: u64,
    /// Bit i set iff child octant i exists.
    pub children_mask: u8,
    pub children: [Option<Box<Node>>; 8],
    /// In-memory point buffer, present only while the node is being
    /// split or sampled in-core. Freed (moved out) as soon as the
    /// points are handed to the writer or partitioned to children.
    pub points: Vec<Point>,
}

impl Node {
    pub fn new(id: String, bounds: Cube, point_count: u64) -> Self {
        Self {
            id,
            bounds,
            point_count,
            byte_offset: 0,
            children_mask: 0,
            children: Default::default(),
            points: Vec::new(),
        }
    }

    /// Depth in the tree; the root is at depth 0.
    pub fn depth(&self) -> usize {
        self.id.len()
    }

    /// Id a child of this node would have in octant `index`.
    pub fn child_id(&self, index: u8) -> String {
        let mut id = self.id.clone();
        id.push(char::from(b'0' + index));
        id
    }

    /// Create and attach the child for octant `index`.
    pub fn attach_child(&mut self, index: u8, point_count: u64) -> &mut Node {
        debug_assert!(index < 8);
        let child = Node::new(self.child_id(index), child_cube(&self.bounds, index), point_count);
        self.children_mask |= 1 << index;
        self.children[index as usize] = Some(Box::new(child));
        self.children[index as usize].as_deref_mut().unwrap()
    }

    /// Re-attach a subtree that was built elsewhere (a deferred pool
    /// job). The slot is located by walking the subtree's id from this
    /// node.
    pub fn graft(&mut self, subtree: Box<Node>) {
        let suffix = subtree
            .id
            .strip_prefix(&self.id)
            .expect("subtree id must extend this node's id");
        let mut slot = self;
        let mut chars = suffix.bytes();
        let mut index = chars.next().expect("subtree must be a strict descendant") - b'0';
        for next in chars {
            slot.children_mask |= 1 << index;
            slot = slot.children[index as usize]
                .as_deref_mut()
                .expect("intermediate node missing on graft path");
            index = next - b'0';
        }
        slot.children_mask |= 1 << index;
        slot.children[index as usize] = Some(subtree);
    }

    /// Move the in-core buffer out of the node, leaving it empty.
    pub fn take_points(&mut self) -> Vec<Point> {
        std::mem::take(&mut self.points)
    }

    pub fn is_leaf(&self) -> bool {
        self.children_mask == 0
    }

    /// Pre-order walk over the whole subtree.
    pub fn visit<F: FnMut(&Node)>(&self, f: &mut F) {
        f(self);
        for child in self.children.iter().flatten() {
            child.visit(f);
        }
    }

    /// Pre-order walk with mutable access, used to patch byte offsets
    /// after the writer drains.
    pub fn visit_mut<F: FnMut(&mut Node)>(&mut self, f: &mut F) {
        f(self);
        for child in self.children.iter_mut().flatten() {
            child.visit_mut(f);
        }
    }
}
