//! Serialized octree blob writer
//!
//! A single writer task owns the output blob and a byte cursor. Split
//! workers hand finished leaves over a channel, either as in-memory
//! point buffers or as paths to intermediate files, and the writer
//! appends them one at a time. Serializing the appends keeps every
//! write sequential and makes offset assignment trivial: each record
//! gets the cursor value at the moment it is written.
//!
//! The writer is also where resources are returned: in-memory buffers
//! release their point budget reservation once on disk, and
//! intermediate files are deleted after their bytes are copied unless
//! the submitter asked to keep them for later sampling.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::build::budget::PointBudget;
use crate::core::{Error, Result};
use crate::octree::point::{points_as_bytes, Point, POINT_RECORD_SIZE};

/// Placement of one finished node in the blob.
#[derive(Debug, Clone)]
pub struct WriteRecord {
    pub id: String,
    pub byte_offset: u64,
    pub point_count: u64,
}

/// Chunk size for copying intermediate files into the blob. Oversized
/// leaves at the depth limit can hold arbitrarily many points, so the
/// copy must stay bounded regardless of file size.
const COPY_CHUNK_BYTES: usize = 1 << 20;

enum WritePayload {
    InCore(Vec<Point>),
    OnDisk { path: PathBuf, keep: bool },
}

struct WriteJob {
    id: String,
    point_count: u64,
    payload: WritePayload,
}

/// Cloneable submission side of the writer channel.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::UnboundedSender<WriteJob>,
}

impl WriterHandle {
    /// Queue an in-memory buffer for appending. The buffer's point
    /// budget reservation is released once the bytes are on disk.
    pub fn submit_in_core(&self, id: &str, points: Vec<Point>) -> Result<()> {
        if points.is_empty() {
            return Err(Error::EmptyNode(id.to_string()));
        }
        self.send(WriteJob {
            id: id.to_string(),
            point_count: points.len() as u64,
            payload: WritePayload::InCore(points),
        })
    }

    /// Queue an intermediate file for appending. The file is deleted
    /// after its contents are copied unless `keep` is set.
    pub fn submit_on_disk(
        &self,
        id: &str,
        path: PathBuf,
        point_count: u64,
        keep: bool,
    ) -> Result<()> {
        if point_count == 0 {
            return Err(Error::EmptyNode(id.to_string()));
        }
        self.send(WriteJob {
            id: id.to_string(),
            point_count,
            payload: WritePayload::OnDisk { path, keep },
        })
    }

    fn send(&self, job: WriteJob) -> Result<()> {
        // The receiver only goes away if the writer task bailed on an
        // I/O error; the real error surfaces from `finish()`.
        self.tx.send(job).map_err(|_| Error::WorkerFailed)
    }
}

pub struct OctreeWriter {
    runtime: tokio::runtime::Handle,
    task: tokio::task::JoinHandle<Result<Vec<WriteRecord>>>,
}

impl OctreeWriter {
    /// Create the blob file and start the writer task. The returned
    /// handle (and its clones) feed the task; the task ends when the
    /// last handle is dropped.
    pub fn start(
        runtime: &tokio::runtime::Handle,
        blob_path: PathBuf,
        budget: Arc<PointBudget>,
    ) -> (Self, WriterHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let task = runtime.spawn(write_loop(blob_path, rx, budget));
        (
            Self {
                runtime: runtime.clone(),
                task,
            },
            WriterHandle { tx },
        )
    }

    /// Wait for the writer to drain and return the blob layout. Every
    /// `WriterHandle` clone must be dropped first or this blocks
    /// forever.
    pub fn finish(self) -> Result<Vec<WriteRecord>> {
        self.runtime
            .block_on(self.task)
            .map_err(|e| Error::Io(std::io::Error::other(e)))?
    }
}

async fn write_loop(
    blob_path: PathBuf,
    mut rx: mpsc::UnboundedReceiver<WriteJob>,
    budget: Arc<PointBudget>,
) -> Result<Vec<WriteRecord>> {
    let mut blob = tokio::fs::File::create(&blob_path)
        .await
        .map_err(|source| Error::OutputOpen {
            path: blob_path.clone(),
            source,
        })?;

    let mut cursor: u64 = 0;
    let mut records = Vec::new();

    while let Some(job) = rx.recv().await {
        let byte_offset = cursor;
        match job.payload {
            WritePayload::InCore(points) => {
                blob.write_all(points_as_bytes(&points)).await?;
                budget.release(points.len() as u64);
            }
            WritePayload::OnDisk { path, keep } => {
                let copied = copy_into_blob(&mut blob, &path).await?;
                if copied != job.point_count * POINT_RECORD_SIZE {
                    return Err(Error::MalformedSource(format!(
                        "intermediate file {} holds {} bytes, expected {} points",
                        path.display(),
                        copied,
                        job.point_count
                    )));
                }
                if !keep {
                    tokio::fs::remove_file(&path).await?;
                }
            }
        }
        cursor += job.point_count * POINT_RECORD_SIZE;
        records.push(WriteRecord {
            id: job.id,
            byte_offset,
            point_count: job.point_count,
        });
    }

    blob.sync_all().await?;
    log::debug!(
        "blob writer finished: {} nodes, {} bytes",
        records.len(),
        cursor
    );
    Ok(records)
}

/// Append a file's contents to the blob in fixed-size chunks, returning
/// the number of bytes copied.
async fn copy_into_blob(blob: &mut tokio::fs::File, path: &std::path::Path) -> Result<u64> {
    let mut source = tokio::fs::File::open(path).await?;
    let mut buf = vec![0u8; COPY_CHUNK_BYTES];
    let mut copied = 0u64;
    loop {
        let n = source.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        blob.write_all(&buf[..n]).await?;
        copied += n as u64;
    }
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::octree::point::bytes_to_points;

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap()
    }

    #[test]
    fn test_writer_appends_sequentially() {
        let rt = runtime();
        let dir = tempfile::tempdir().unwrap();
        let blob_path = dir.path().join("octree.bin");
        let budget = Arc::new(PointBudget::new(1000));

        budget.acquire_untracked(5);
        let (writer, handle) = OctreeWriter::start(rt.handle(), blob_path.clone(), budget.clone());

        let first: Vec<Point> = (0..3).map(|i| Point::new(i as f32, 0.0, 0.0)).collect();
        let second: Vec<Point> = (0..2).map(|i| Point::new(0.0, i as f32, 0.0)).collect();
        handle.submit_in_core("0", first).unwrap();
        handle.submit_in_core("1", second).unwrap();
        drop(handle);

        let records = writer.finish().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].byte_offset, 0);
        assert_eq!(records[0].point_count, 3);
        assert_eq!(records[1].byte_offset, 3 * POINT_RECORD_SIZE);
        assert_eq!(records[1].point_count, 2);
        // Budget reservations returned by the writer.
        assert_eq!(budget.used(), 0);

        let bytes = std::fs::read(&blob_path).unwrap();
        assert_eq!(bytes.len() as u64, 5 * POINT_RECORD_SIZE);
        let points = bytes_to_points(&bytes);
        assert_eq!(points[2].x, 2.0);
        assert_eq!(points[4].y, 1.0);
    }

    #[test]
    fn test_writer_copies_and_deletes_intermediate_files() {
        let rt = runtime();
        let dir = tempfile::tempdir().unwrap();
        let blob_path = dir.path().join("octree.bin");
        let budget = Arc::new(PointBudget::new(1000));

        let consumed = dir.path().join("p3");
        let kept = dir.path().join("p5");
        let points: Vec<Point> = (0..4).map(|i| Point::new(i as f32, 0.0, 0.0)).collect();
        std::fs::write(&consumed, points_as_bytes(&points)).unwrap();
        std::fs::write(&kept, points_as_bytes(&points[..2])).unwrap();

        let (writer, handle) = OctreeWriter::start(rt.handle(), blob_path, budget);
        handle.submit_on_disk("3", consumed.clone(), 4, false).unwrap();
        handle.submit_on_disk("5", kept.clone(), 2, true).unwrap();
        drop(handle);

        let records = writer.finish().unwrap();
        assert_eq!(records[1].byte_offset, 4 * POINT_RECORD_SIZE);
        assert!(!consumed.exists());
        assert!(kept.exists());
    }

    #[test]
    fn test_writer_copies_files_larger_than_one_chunk() {
        let rt = runtime();
        let dir = tempfile::tempdir().unwrap();
        let blob_path = dir.path().join("octree.bin");
        let budget = Arc::new(PointBudget::new(10));

        // 100k records is ~1.2 MiB, larger than one copy chunk.
        let count = 100_000u64;
        let points: Vec<Point> = (0..count).map(|i| Point::new(i as f32, 0.0, 0.0)).collect();
        let big = dir.path().join("p0");
        std::fs::write(&big, points_as_bytes(&points)).unwrap();
        assert!(points.len() * POINT_RECORD_SIZE as usize > COPY_CHUNK_BYTES);

        let (writer, handle) = OctreeWriter::start(rt.handle(), blob_path.clone(), budget);
        handle.submit_on_disk("0", big, count, false).unwrap();
        drop(handle);

        let records = writer.finish().unwrap();
        assert_eq!(records[0].point_count, count);
        let bytes = std::fs::read(&blob_path).unwrap();
        assert_eq!(bytes.len() as u64, count * POINT_RECORD_SIZE);
        let copied = bytes_to_points(&bytes);
        assert_eq!(copied[0].x, 0.0);
        assert_eq!(copied[count as usize - 1].x, (count - 1) as f32);
    }

    #[test]
    fn test_writer_rejects_empty_submission() {
        let rt = runtime();
        let dir = tempfile::tempdir().unwrap();
        let budget = Arc::new(PointBudget::new(10));
        let (writer, handle) = OctreeWriter::start(rt.handle(), dir.path().join("octree.bin"), budget);

        assert!(matches!(
            handle.submit_in_core("7", Vec::new()),
            Err(Error::EmptyNode(_))
        ));
        assert!(matches!(
            handle.submit_on_disk("7", dir.path().join("p7"), 0, false),
            Err(Error::EmptyNode(_))
        ));

        drop(handle);
        assert!(writer.finish().unwrap().is_empty());
    }

    #[test]
    fn test_writer_detects_truncated_intermediate_file() {
        let rt = runtime();
        let dir = tempfile::tempdir().unwrap();
        let budget = Arc::new(PointBudget::new(10));
        let short = dir.path().join("p2");
        std::fs::write(&short, [0u8; 10]).unwrap();

        let (writer, handle) = OctreeWriter::start(rt.handle(), dir.path().join("octree.bin"), budget);
        handle.submit_on_disk("2", short, 4, false).unwrap();
        drop(handle);

        assert!(matches!(writer.finish(), Err(Error::MalformedSource(_))));
    }
}
