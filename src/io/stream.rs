//! Prefetching point stream
//!
//! Reads an intermediate point file ahead of the consumer: a task on
//! the shared runtime fills batches and hands them over a channel with
//! capacity 2, so one batch is being consumed while the next is being
//! read, and the reader stalls when the consumer falls behind.

use std::path::PathBuf;

use tokio::io::AsyncReadExt;
use tokio::sync::mpsc;

use crate::core::{Error, Result};
use crate::octree::point::{bytes_to_points, Point, POINT_RECORD_SIZE};

/// Two batches in flight: one read ahead, one being consumed.
const CHANNEL_DEPTH: usize = 2;

pub struct PointStream {
    rx: mpsc::Receiver<Result<Vec<Point>>>,
}

impl PointStream {
    /// Start reading `path` in batches of up to `batch_points`.
    pub fn open(handle: &tokio::runtime::Handle, path: PathBuf, batch_points: usize) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
        handle.spawn(async move {
            if let Err(err) = read_loop(&path, batch_points, &tx).await {
                let _ = tx.send(Err(err)).await;
            }
        });
        Self { rx }
    }

    /// Next batch, blocking the calling (worker) thread until the
    /// prefetcher has one ready. `None` means the file is exhausted.
    pub fn next_batch(&mut self) -> Option<Result<Vec<Point>>> {
        self.rx.blocking_recv()
    }
}

async fn read_loop(
    path: &PathBuf,
    batch_points: usize,
    tx: &mpsc::Sender<Result<Vec<Point>>>,
) -> Result<()> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|source| Error::SourceOpen {
            path: path.clone(),
            source,
        })?;

    let batch_bytes = batch_points * POINT_RECORD_SIZE as usize;
    loop {
        let mut bytes = vec![0u8; batch_bytes];
        let mut filled = 0;
        while filled < batch_bytes {
            let n = file.read(&mut bytes[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            return Ok(());
        }
        if filled % POINT_RECORD_SIZE as usize != 0 {
            return Err(Error::MalformedSource(format!(
                "{}: unexpected end of file mid-record",
                path.display()
            )));
        }
        bytes.truncate(filled);
        let batch = bytes_to_points(&bytes);
        let at_eof = filled < batch_bytes;
        if tx.send(Ok(batch)).await.is_err() {
            // Consumer dropped the stream early.
            return Ok(());
        }
        if at_eof {
            return Ok(());
        }
    }
}
