//! ASCII .pts point source
//!
//! Whitespace-separated `x y z [extras]` per line. An optional leading
//! line holding a single integer is treated as the declared point
//! count. Extra per-line columns (intensity, color) are ignored.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::core::{Error, Result};
use crate::io::source::PointSource;
use crate::octree::cube::Bounds;
use crate::octree::point::Point;

pub struct PtsSource {
    path: PathBuf,
    reader: BufReader<File>,
    declared_count: Option<u64>,
    line: String,
    line_number: u64,
}

impl PtsSource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| Error::SourceOpen {
            path: path.to_path_buf(),
            source,
        })?;
        let mut source = Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            declared_count: None,
            line: String::new(),
            line_number: 0,
        };
        source.read_header()?;
        Ok(source)
    }

    fn read_header(&mut self) -> Result<()> {
        // Peek the first non-empty line; a lone integer is the count
        // header and is consumed, anything else is point data and is
        // kept for the first batch.
        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                return Ok(());
            }
            self.line_number += 1;
            let trimmed = self.line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if let Ok(count) = trimmed.parse::<u64>() {
                self.declared_count = Some(count);
                self.line.clear();
            }
            return Ok(());
        }
    }

    /// Parse the buffered line, if it holds point data.
    fn parse_buffered(&mut self, out: &mut Vec<Point>) -> Result<()> {
        let trimmed = self.line.trim();
        if trimmed.is_empty() {
            return Ok(());
        }
        let mut fields = trimmed.split_ascii_whitespace();
        let coords: std::result::Result<Vec<f32>, _> = fields
            .by_ref()
            .take(3)
            .map(|f| f.parse::<f32>())
            .collect();
        match coords {
            Ok(c) if c.len() == 3 => {
                out.push(Point::new(c[0], c[1], c[2]));
                Ok(())
            }
            _ => Err(Error::MalformedSource(format!(
                "{}:{}: expected three coordinates",
                self.path.display(),
                self.line_number
            ))),
        }
    }
}

impl PointSource for PtsSource {
    fn total_points(&self) -> Option<u64> {
        self.declared_count
    }

    fn header_bounds(&self) -> Option<Bounds> {
        None
    }

    fn read_batch(&mut self, out: &mut Vec<Point>, max: usize) -> Result<usize> {
        out.clear();
        // A line may still be buffered from the header probe.
        if !self.line.is_empty() {
            self.parse_buffered(out)?;
            self.line.clear();
        }
        while out.len() < max {
            self.line.clear();
            if self.reader.read_line(&mut self.line)? == 0 {
                break;
            }
            self.line_number += 1;
            self.parse_buffered(out)?;
        }
        self.line.clear();
        Ok(out.len())
    }
}
