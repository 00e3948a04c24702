//! LAS point source
//!
//! Reads the subset of the LAS header the builder needs: offset to
//! point data, record length, point format, point count (legacy u32 or
//! the 64-bit count when the legacy field is zero), the coordinate
//! scale/offset, and the min/max bounds. Coordinates are decoded as
//! `i32 * scale + offset`; color and all other attributes are skipped,
//! the builder stores bare XYZ records.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use glam::Vec3;

use crate::core::{Error, Result};
use crate::io::source::PointSource;
use crate::octree::cube::Bounds;
use crate::octree::point::Point;

const OFFSET_POINT_DATA: u64 = 96;
const OFFSET_POINT_FORMAT: u64 = 104;
const OFFSET_RECORD_LENGTH: u64 = 105;
const OFFSET_LEGACY_COUNT: u64 = 107;
const OFFSET_EXTENDED_COUNT: u64 = 140;
const OFFSET_SCALE: u64 = 131;

pub struct LasSource {
    reader: BufReader<File>,
    record_length: u16,
    point_format: u8,
    num_points: u64,
    points_read: u64,
    scale: [f64; 3],
    offset: [f64; 3],
    bounds: Bounds,
    record_buf: Vec<u8>,
}

impl LasSource {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| Error::SourceOpen {
            path: path.to_path_buf(),
            source,
        })?;
        let mut reader = BufReader::new(file);

        let point_data_offset = read_u32_at(&mut reader, OFFSET_POINT_DATA)? as u64;
        let point_format = read_u8_at(&mut reader, OFFSET_POINT_FORMAT)?;
        let record_length = read_u16_at(&mut reader, OFFSET_RECORD_LENGTH)?;
        if record_length < 12 {
            return Err(Error::MalformedSource(format!(
                "{}: point record length {record_length} is too short",
                path.display()
            )));
        }

        let legacy_count = read_u32_at(&mut reader, OFFSET_LEGACY_COUNT)?;
        let num_points = if legacy_count == 0 {
            // Pre-1.4 files store the count only in the legacy field;
            // newer files zero it and use the 64-bit count.
            read_u64_at(&mut reader, OFFSET_EXTENDED_COUNT)?
        } else {
            legacy_count as u64
        };

        reader.seek(SeekFrom::Start(OFFSET_SCALE))?;
        let scale = [read_f64(&mut reader)?, read_f64(&mut reader)?, read_f64(&mut reader)?];
        let offset = [read_f64(&mut reader)?, read_f64(&mut reader)?, read_f64(&mut reader)?];
        // Header order is max/min interleaved per axis.
        let max_x = read_f64(&mut reader)?;
        let min_x = read_f64(&mut reader)?;
        let max_y = read_f64(&mut reader)?;
        let min_y = read_f64(&mut reader)?;
        let max_z = read_f64(&mut reader)?;
        let min_z = read_f64(&mut reader)?;

        reader.seek(SeekFrom::Start(point_data_offset))?;

        Ok(Self {
            reader,
            record_length,
            point_format,
            num_points,
            points_read: 0,
            scale,
            offset,
            bounds: Bounds::new(
                Vec3::new(min_x as f32, min_y as f32, min_z as f32),
                Vec3::new(max_x as f32, max_y as f32, max_z as f32),
            ),
            record_buf: vec![0u8; record_length as usize],
        })
    }

    pub fn point_format(&self) -> u8 {
        self.point_format
    }

    fn read_point(&mut self) -> Result<Point> {
        self.reader
            .read_exact(&mut self.record_buf)
            .map_err(|_| Error::MalformedSource("unexpected end of LAS point data".to_string()))?;

        let x = i32::from_le_bytes(self.record_buf[0..4].try_into().unwrap());
        let y = i32::from_le_bytes(self.record_buf[4..8].try_into().unwrap());
        let z = i32::from_le_bytes(self.record_buf[8..12].try_into().unwrap());

        Ok(Point::new(
            (x as f64 * self.scale[0] + self.offset[0]) as f32,
            (y as f64 * self.scale[1] + self.offset[1]) as f32,
            (z as f64 * self.scale[2] + self.offset[2]) as f32,
        ))
    }
}

impl PointSource for LasSource {
    fn total_points(&self) -> Option<u64> {
        Some(self.num_points)
    }

    fn header_bounds(&self) -> Option<Bounds> {
        Some(self.bounds)
    }

    fn read_batch(&mut self, out: &mut Vec<Point>, max: usize) -> Result<usize> {
        out.clear();
        let remaining = (self.num_points - self.points_read).min(max as u64) as usize;
        out.reserve(remaining);
        for _ in 0..remaining {
            out.push(self.read_point()?);
        }
        self.points_read += remaining as u64;
        Ok(remaining)
    }
}

fn read_u8_at(reader: &mut (impl Read + Seek), offset: u64) -> Result<u8> {
    let mut buf = [0u8; 1];
    read_header_at(reader, offset, &mut buf)?;
    Ok(buf[0])
}

fn read_u16_at(reader: &mut (impl Read + Seek), offset: u64) -> Result<u16> {
    let mut buf = [0u8; 2];
    read_header_at(reader, offset, &mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32_at(reader: &mut (impl Read + Seek), offset: u64) -> Result<u32> {
    let mut buf = [0u8; 4];
    read_header_at(reader, offset, &mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64_at(reader: &mut (impl Read + Seek), offset: u64) -> Result<u64> {
    let mut buf = [0u8; 8];
    read_header_at(reader, offset, &mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_f64(reader: &mut impl Read) -> Result<f64> {
    let mut buf = [0u8; 8];
    reader
        .read_exact(&mut buf)
        .map_err(|_| Error::MalformedSource("truncated LAS header".to_string()))?;
    Ok(f64::from_le_bytes(buf))
}

fn read_header_at(reader: &mut (impl Read + Seek), offset: u64, buf: &mut [u8]) -> Result<()> {
    reader.seek(SeekFrom::Start(offset))?;
    reader
        .read_exact(buf)
        .map_err(|_| Error::MalformedSource("truncated LAS header".to_string()))
}
