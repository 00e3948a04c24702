//! Batched point sink
//!
//! Appends point records to one file, buffering up to a flush
//! threshold so the partitioning loops issue large sequential writes
//! instead of one syscall per point.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::core::{Error, Result};
use crate::octree::point::{points_as_bytes, Point};

pub struct PointSink {
    path: PathBuf,
    file: File,
    buffer: Vec<Point>,
    flush_threshold: usize,
    written: u64,
}

impl PointSink {
    /// Create (truncating) the sink file.
    pub fn create(path: &Path, flush_threshold: usize) -> Result<Self> {
        let file = File::create(path).map_err(|source| Error::OutputOpen {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            file,
            buffer: Vec::with_capacity(flush_threshold),
            flush_threshold: flush_threshold.max(1),
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Points pushed so far, flushed or not.
    pub fn point_count(&self) -> u64 {
        self.written + self.buffer.len() as u64
    }

    pub fn push(&mut self, p: Point) -> Result<()> {
        self.buffer.push(p);
        if self.buffer.len() >= self.flush_threshold {
            self.flush()?;
        }
        Ok(())
    }

    pub fn push_batch(&mut self, points: &[Point]) -> Result<()> {
        self.buffer.extend_from_slice(points);
        if self.buffer.len() >= self.flush_threshold {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if !self.buffer.is_empty() {
            self.file.write_all(points_as_bytes(&self.buffer))?;
            self.written += self.buffer.len() as u64;
            self.buffer.clear();
        }
        Ok(())
    }

    /// Flush and close, returning the total point count written.
    pub fn finish(mut self) -> Result<u64> {
        self.flush()?;
        self.file.sync_data()?;
        Ok(self.written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::octree::point::{bytes_to_points, POINT_RECORD_SIZE};

    #[test]
    fn test_sink_batches_and_counts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p2");
        let mut sink = PointSink::create(&path, 8).unwrap();

        for i in 0..20 {
            sink.push(Point::new(i as f32, 0.0, 0.0)).unwrap();
        }
        assert_eq!(sink.point_count(), 20);
        let written = sink.finish().unwrap();
        assert_eq!(written, 20);

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len() as u64, 20 * POINT_RECORD_SIZE);
        let points = bytes_to_points(&bytes);
        assert_eq!(points[7].x, 7.0);
        assert_eq!(points[19].x, 19.0);
    }

    #[test]
    fn test_sink_push_batch_preserves_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("p5");
        let mut sink = PointSink::create(&path, 4).unwrap();

        let first: Vec<Point> = (0..3).map(|i| Point::new(i as f32, 1.0, 0.0)).collect();
        let second: Vec<Point> = (3..9).map(|i| Point::new(i as f32, 1.0, 0.0)).collect();
        sink.push_batch(&first).unwrap();
        sink.push_batch(&second).unwrap();
        assert_eq!(sink.finish().unwrap(), 9);

        let bytes = std::fs::read(&path).unwrap();
        let xs: Vec<f32> = bytes_to_points(&bytes).iter().map(|p| p.x).collect();
        assert_eq!(xs, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
    }
}
