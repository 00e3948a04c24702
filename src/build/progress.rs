//! Build progress tracking
//!
//! A shared counter of points that have reached a terminal state,
//! polled by a reporter thread that logs a progress line at a fixed
//! interval. Observational only, nothing consults it for control
//! flow. Only leaf points count toward the total, so the percentage
//! ends at exactly 100% of the input.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

pub struct Progress {
    finalized: AtomicU64,
    total: u64,
}

impl Progress {
    pub fn new(total: u64) -> Self {
        Self {
            finalized: AtomicU64::new(0),
            total,
        }
    }

    pub fn add(&self, points: u64) {
        self.finalized.fetch_add(points, Ordering::Relaxed);
    }

    pub fn finalized(&self) -> u64 {
        self.finalized.load(Ordering::Relaxed)
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.finalized() as f64 / self.total as f64 * 100.0
    }
}

/// Periodic progress logger on its own thread.
pub struct ProgressReporter {
    stop: Arc<(Mutex<bool>, Condvar)>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl ProgressReporter {
    pub fn start(progress: Arc<Progress>, interval: Duration) -> Self {
        let stop = Arc::new((Mutex::new(false), Condvar::new()));
        let thread_stop = Arc::clone(&stop);
        let thread = std::thread::Builder::new()
            .name("progress".to_string())
            .spawn(move || {
                let (lock, signal) = &*thread_stop;
                let mut stopped = lock.lock().unwrap();
                loop {
                    let (next, timeout) = signal.wait_timeout(stopped, interval).unwrap();
                    stopped = next;
                    if *stopped {
                        break;
                    }
                    if timeout.timed_out() {
                        log::info!(
                            "progress: {} / {} points ({:.1}%)",
                            progress.finalized(),
                            progress.total(),
                            progress.percent()
                        );
                    }
                }
            })
            .expect("failed to spawn progress reporter");
        Self {
            stop,
            thread: Some(thread),
        }
    }

    /// Stop reporting and join the thread.
    pub fn stop(mut self) {
        let (lock, signal) = &*self.stop;
        *lock.lock().unwrap() = true;
        signal.notify_all();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}
