//! Point source abstraction
//!
//! A `PointSource` is a sequential reader over one input file. Sources
//! that can answer cheaply from a header (LAS) report their count and
//! bounds up front; the others are scanned once before the build.

use std::path::Path;

use crate::core::{Error, Result};
use crate::io::las::LasSource;
use crate::io::pts::PtsSource;
use crate::io::raw::RawSource;
use crate::octree::cube::Bounds;
use crate::octree::point::Point;

/// Sequential reader over a single input file.
pub trait PointSource: Send {
    /// Total number of points, if known without reading the data.
    fn total_points(&self) -> Option<u64>;

    /// Bounding box from the file header, if the format stores one.
    fn header_bounds(&self) -> Option<Bounds>;

    /// Read up to `max` points into `out` (cleared first). Returns the
    /// number of points read; 0 means end of input.
    fn read_batch(&mut self, out: &mut Vec<Point>, max: usize) -> Result<usize>;
}

/// Open an input file, dispatching on its extension.
///
/// `.las` is parsed from its header; `.pts` is ASCII x y z per line;
/// anything else is treated as raw binary XYZ records.
pub fn open_source(path: &Path) -> Result<Box<dyn PointSource>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("las") => Ok(Box::new(LasSource::open(path)?)),
        Some("pts") => Ok(Box::new(PtsSource::open(path)?)),
        Some("xyz") | Some("raw") | Some("bin") => Ok(Box::new(RawSource::open(path)?)),
        _ => Err(Error::UnsupportedFormat(path.to_path_buf())),
    }
}

/// Layout of one input file: where it is and how many points it holds.
#[derive(Debug, Clone)]
pub struct SourceLayout {
    pub path: std::path::PathBuf,
    pub point_count: u64,
}

/// Full scan of a source: bounds and exact count. Used for formats
/// whose header answers neither.
pub fn scan_source(source: &mut dyn PointSource) -> Result<(Bounds, u64)> {
    let mut bounds = Bounds::default();
    let mut count = 0u64;
    let mut batch = Vec::new();
    loop {
        let n = source.read_batch(&mut batch, 65_536)?;
        if n == 0 {
            break;
        }
        for p in &batch {
            bounds.extend(p);
        }
        count += n as u64;
    }
    Ok((bounds, count))
}

/// Resolve the global bounding cube and per-file point counts across
/// all inputs, preferring header information and falling back to a
/// scan pass.
pub fn measure_inputs(paths: &[std::path::PathBuf]) -> Result<(Bounds, Vec<SourceLayout>)> {
    let mut global = Bounds::default();
    let mut layouts = Vec::with_capacity(paths.len());

    for path in paths {
        let mut source = open_source(path)?;
        let (bounds, count) = match (source.header_bounds(), source.total_points()) {
            (Some(bounds), Some(count)) => (bounds, count),
            _ => scan_source(source.as_mut())?,
        };
        if count == 0 {
            return Err(Error::MalformedSource(format!(
                "{} contains no points",
                path.display()
            )));
        }
        global.merge(&bounds);
        layouts.push(SourceLayout {
            path: path.clone(),
            point_count: count,
        });
    }

    Ok((global, layouts))
}
