//! Raw binary XYZ point source
//!
//! The file is a bare concatenation of 12-byte point records, the same
//! layout the builder uses for its intermediate files and the final
//! blob. The count comes from the file length; bounds require a scan.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use crate::core::{Error, Result};
use crate::io::source::PointSource;
use crate::octree::cube::Bounds;
use crate::octree::point::{bytes_to_points, Point, POINT_RECORD_SIZE};

pub struct RawSource {
    path: PathBuf,
    reader: BufReader<File>,
    num_points: u64,
}

impl RawSource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| Error::SourceOpen {
            path: path.to_path_buf(),
            source,
        })?;
        let len = file.metadata()?.len();
        if len % POINT_RECORD_SIZE != 0 {
            return Err(Error::MalformedSource(format!(
                "{}: length {} is not a multiple of the {}-byte record size",
                path.display(),
                len,
                POINT_RECORD_SIZE
            )));
        }
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            num_points: len / POINT_RECORD_SIZE,
        })
    }
}

impl PointSource for RawSource {
    fn total_points(&self) -> Option<u64> {
        Some(self.num_points)
    }

    fn header_bounds(&self) -> Option<Bounds> {
        None
    }

    fn read_batch(&mut self, out: &mut Vec<Point>, max: usize) -> Result<usize> {
        out.clear();
        let mut bytes = vec![0u8; max * POINT_RECORD_SIZE as usize];
        let mut filled = 0;
        // A BufReader read may return short; keep going until the
        // batch is full or the file ends.
        loop {
            let n = self.reader.read(&mut bytes[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
            if filled == bytes.len() {
                break;
            }
        }
        if filled % POINT_RECORD_SIZE as usize != 0 {
            return Err(Error::MalformedSource(format!(
                "{}: unexpected end of file mid-record",
                self.path.display()
            )));
        }
        out.extend_from_slice(&bytes_to_points(&bytes[..filled]));
        Ok(out.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::octree::point::points_as_bytes;

    #[test]
    fn test_raw_roundtrip_in_batches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cloud.xyz");
        let points: Vec<Point> = (0..10).map(|i| Point::new(i as f32, 0.0, -1.0)).collect();
        std::fs::write(&path, points_as_bytes(&points)).unwrap();

        let mut source = RawSource::open(&path).unwrap();
        assert_eq!(source.total_points(), Some(10));
        assert!(source.header_bounds().is_none());

        let mut batch = Vec::new();
        let mut read_back = Vec::new();
        loop {
            if source.read_batch(&mut batch, 4).unwrap() == 0 {
                break;
            }
            read_back.extend_from_slice(&batch);
        }
        assert_eq!(read_back, points);
    }

    #[test]
    fn test_raw_rejects_partial_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cloud.xyz");
        std::fs::write(&path, [0u8; 14]).unwrap();
        assert!(matches!(
            RawSource::open(&path),
            Err(Error::MalformedSource(_))
        ));
    }
}
