//! Node sampling (LOD generation)
//!
//! Internal nodes keep a fixed-size representative subset of their
//! points instead of the full set. Two sampling shapes exist:
//!
//! * interleaved: every stride-th point of a stream, collected during
//!   the same pass that partitions the node's points to its children.
//!   Deterministic, O(1) memory, input order preserved.
//! * post-hoc: distinct random indices drawn from already-finalized
//!   child point files, proportionally per child. Used once at the top
//!   level to merge the independently built octant subtrees into the
//!   root's sample.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::core::{Error, Result};
use crate::octree::node::{point_file, Node};
use crate::octree::point::{points_as_bytes, Point, POINT_RECORD_SIZE};

/// Sampling interval for interleaved sampling: one point out of every
/// `stride` is kept. Never zero.
pub fn sample_stride(available: u64, target: u32) -> u64 {
    (available / target.max(1) as u64).max(1)
}

/// Collects every stride-th offered point, up to a target count.
///
/// Drive it with the same loop that partitions points to children so
/// the sample costs no extra read pass.
pub struct InterleavedSampler {
    stride: u64,
    target: usize,
    seen: u64,
    points: Vec<Point>,
}

impl InterleavedSampler {
    pub fn new(available: u64, target: u32) -> Self {
        Self {
            stride: sample_stride(available, target),
            target: target as usize,
            seen: 0,
            points: Vec::with_capacity((target as usize).min(available as usize)),
        }
    }

    /// Offer the next point of the stream.
    pub fn offer(&mut self, p: &Point) {
        if self.seen % self.stride == 0 && self.points.len() < self.target {
            self.points.push(*p);
        }
        self.seen += 1;
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Take the collected sample.
    pub fn finish(self) -> Vec<Point> {
        self.points
    }
}

/// Sample `target` points into `node` from its children's finalized
/// point files, proportionally per child, and write them to the node's
/// own point file.
///
/// Indices within a child are distinct, drawn by rejection from a
/// seeded generator, and read individually (the child files stay on
/// disk untouched). The node's `point_count` becomes the number of
/// points actually written, which is capped at both `target` and the
/// total the children hold. Per-child shares are rounded, so a running
/// quota caps each child and the last child absorbs the remainder;
/// rounding can never push the total past the target.
pub fn sample_from_children(
    node: &mut Node,
    output_dir: &Path,
    target: u32,
    seed: u64,
) -> Result<u64> {
    let children: Vec<&Node> = node.children.iter().flatten().map(|c| c.as_ref()).collect();
    let total_child_points: u64 = children.iter().map(|c| c.point_count).sum();
    let to_sample = (target as u64).min(total_child_points);

    let parent_path = point_file(output_dir, &node.id);
    let file = File::create(&parent_path).map_err(|source| Error::OutputOpen {
        path: parent_path.clone(),
        source,
    })?;
    let mut out = BufWriter::new(file);

    let mut rng = SmallRng::seed_from_u64(seed);
    let mut written = 0u64;
    let mut remaining = to_sample;

    for (index, child) in children.iter().enumerate() {
        let share = if index + 1 == children.len() {
            remaining.min(child.point_count)
        } else {
            (((child.point_count as f64 / total_child_points as f64)
                * to_sample as f64)
                .round() as u64)
                .min(child.point_count)
                .min(remaining)
        };
        remaining -= share;
        if share == 0 {
            continue;
        }

        let child_path = point_file(output_dir, &child.id);
        let mut child_file = File::open(&child_path).map_err(|source| Error::OutputOpen {
            path: child_path.clone(),
            source,
        })?;

        let mut picked: HashSet<u64> = HashSet::with_capacity(share as usize);
        while (picked.len() as u64) < share {
            let index = rng.random_range(0..child.point_count);
            if !picked.insert(index) {
                continue;
            }
            child_file.seek(SeekFrom::Start(index * POINT_RECORD_SIZE))?;
            let mut record = [0u8; POINT_RECORD_SIZE as usize];
            child_file.read_exact(&mut record).map_err(|_| {
                Error::MalformedSource(format!(
                    "unexpected end of point file {}",
                    child_path.display()
                ))
            })?;
            out.write_all(&record)?;
            written += 1;
        }
    }
    drop(children);

    out.flush()?;
    node.point_count = written;
    Ok(written)
}

/// Write an in-memory sample to the node's point file. Used when a
/// node finalized in-core must also leave its points on disk for a
/// later post-hoc merge.
pub fn persist_sample(output_dir: &Path, id: &str, points: &[Point]) -> Result<()> {
    let path = point_file(output_dir, id);
    std::fs::write(&path, points_as_bytes(points)).map_err(|source| Error::OutputOpen {
        path,
        source,
    })
}
