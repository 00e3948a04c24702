//! Bounded worker pool for split jobs
//!
//! A thin layer over a rayon thread pool: a fixed worker count, job
//! submission that is legal from inside a running job (recursive
//! fan-out), a condvar drain barrier instead of polling, and a shared
//! failure flag so one failed job aborts the whole build instead of
//! silently producing a truncated octree.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crate::core::{Error, Result};

struct PoolState {
    active: Mutex<usize>,
    drained: Condvar,
    failed: AtomicBool,
}

pub struct WorkerPool {
    pool: rayon::ThreadPool,
    state: Arc<PoolState>,
}

/// Decrements the active count when the job ends, panicking or not, so
/// `wait()` cannot hang on a crashed worker.
struct ActiveJob(Arc<PoolState>);

impl Drop for ActiveJob {
    fn drop(&mut self) {
        let mut active = self.0.active.lock().unwrap();
        *active -= 1;
        if *active == 0 {
            self.0.drained.notify_all();
        }
    }
}

impl WorkerPool {
    pub fn new(threads: usize) -> Result<Self> {
        let state = Arc::new(PoolState {
            active: Mutex::new(0),
            drained: Condvar::new(),
            failed: AtomicBool::new(false),
        });

        let handler_state = Arc::clone(&state);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("split-worker-{i}"))
            .panic_handler(move |_| {
                log::error!("worker job panicked");
                handler_state.failed.store(true, Ordering::Release);
            })
            .build()
            .map_err(|e| Error::Io(std::io::Error::other(e)))?;

        Ok(Self { pool, state })
    }

    /// Queue a job. May be called from inside a running job.
    pub fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        *self.state.active.lock().unwrap() += 1;
        let guard = ActiveJob(Arc::clone(&self.state));
        self.pool.spawn(move || {
            let _guard = guard;
            job();
        });
    }

    /// Block until no job is queued or running.
    pub fn wait(&self) {
        let mut active = self.state.active.lock().unwrap();
        while *active > 0 {
            active = self.state.drained.wait(active).unwrap();
        }
    }

    /// Mark the build as failed; checked after the drain barrier.
    pub fn fail(&self) {
        self.state.failed.store(true, Ordering::Release);
    }

    pub fn has_failed(&self) -> bool {
        self.state.failed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_wait_drains_all_jobs() {
        let pool = WorkerPool::new(4).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..32 {
            let counter = Arc::clone(&counter);
            pool.spawn(move || {
                counter.fetch_add(1, Ordering::Relaxed);
            });
        }
        pool.wait();
        assert_eq!(counter.load(Ordering::Relaxed), 32);
        assert!(!pool.has_failed());
    }

    #[test]
    fn test_jobs_may_submit_jobs() {
        let pool = Arc::new(WorkerPool::new(2).unwrap());
        let counter = Arc::new(AtomicUsize::new(0));

        let inner_pool = Arc::clone(&pool);
        let inner_counter = Arc::clone(&counter);
        pool.spawn(move || {
            inner_counter.fetch_add(1, Ordering::Relaxed);
            for _ in 0..4 {
                let counter = Arc::clone(&inner_counter);
                inner_pool.spawn(move || {
                    counter.fetch_add(1, Ordering::Relaxed);
                });
            }
        });

        pool.wait();
        assert_eq!(counter.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn test_failure_flag_sticks() {
        let pool = WorkerPool::new(2).unwrap();
        pool.spawn(|| {});
        pool.fail();
        pool.wait();
        assert!(pool.has_failed());
    }
}
