//! Resource budgets for the build
//!
//! Two ceilings bound the build's resource usage: `PointBudget` caps
//! points resident in memory across all concurrent in-core splits, and
//! `FileBudget` caps simultaneously open intermediate file handles.
//!
//! `PointBudget` never blocks: a split that cannot get headroom falls
//! through to the streaming path instead of waiting, so producer and
//! consumer jobs sharing the worker pool cannot deadlock on memory.
//! `FileBudget` does block (condvar, not busy-wait): a split holds its
//! handles only for the duration of one partitioning pass.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};

/// Ceiling on in-memory points across concurrent in-core operations.
pub struct PointBudget {
    limit: u64,
    used: AtomicU64,
}

impl PointBudget {
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            used: AtomicU64::new(0),
        }
    }

    /// Reserve `points` if the ceiling allows it. Never blocks.
    pub fn try_acquire(&self, points: u64) -> bool {
        let mut used = self.used.load(Ordering::Relaxed);
        loop {
            if used + points > self.limit {
                return false;
            }
            match self.used.compare_exchange_weak(
                used,
                used + points,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(current) => used = current,
            }
        }
    }

    /// Reserve `points` unconditionally. Used for the small sample
    /// copies made while a subtree already holds a reservation, so the
    /// release accounting stays symmetric.
    pub fn acquire_untracked(&self, points: u64) {
        self.used.fetch_add(points, Ordering::AcqRel);
    }

    pub fn release(&self, points: u64) {
        let previous = self.used.fetch_sub(points, Ordering::AcqRel);
        debug_assert!(previous >= points, "point budget released below zero");
    }

    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Relaxed)
    }
}

/// Ceiling on simultaneously open intermediate files.
pub struct FileBudget {
    limit: usize,
    open: Mutex<usize>,
    released: Condvar,
}

/// RAII lease of file handles; returns them on drop.
pub struct FileLease<'a> {
    budget: &'a FileBudget,
    count: usize,
}

impl FileBudget {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            open: Mutex::new(0),
            released: Condvar::new(),
        }
    }

    /// Block until `count` handles are available, then lease them.
    /// Requests larger than the whole budget are clamped so a single
    /// caller can always make progress.
    pub fn acquire(&self, count: usize) -> FileLease<'_> {
        let count = count.min(self.limit);
        let mut open = self.open.lock().unwrap();
        while *open + count > self.limit {
            open = self.released.wait(open).unwrap();
        }
        *open += count;
        FileLease { budget: self, count }
    }

    pub fn open_handles(&self) -> usize {
        *self.open.lock().unwrap()
    }
}

impl Drop for FileLease<'_> {
    fn drop(&mut self) {
        let mut open = self.budget.open.lock().unwrap();
        *open -= self.count;
        self.budget.released.notify_all();
    }
}
