//! Per-file content lock.
//!
//! Every operation that reads a block and writes it back (partial writes,
//! truncate, fallocate) holds the lock exclusively for the whole
//! read-merge-encrypt-store sequence. Reads hold it shared, so a reader sees
//! each block either before or after a write, never half-merged.
//!
//! Guards are RAII; the lock is released on every exit path, including `?`
//! early returns and panics.

use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::trace;

use super::stats::ContentStats;

/// Reader-writer lock guarding one file's blocks.
#[derive(Debug)]
pub struct ContentLock {
    inner: RwLock<()>,
    stats: Arc<ContentStats>,
}

impl ContentLock {
    pub fn new(stats: Arc<ContentStats>) -> Self {
        Self {
            inner: RwLock::new(()),
            stats,
        }
    }

    /// Acquire shared access for reading.
    pub fn shared(&self) -> RwLockReadGuard<'_, ()> {
        if let Some(guard) = self.inner.try_read() {
            self.stats.record_lock_fast_path();
            return guard;
        }
        self.stats.record_lock_wait();
        trace!("Waiting for shared content lock");
        self.inner.read()
    }

    /// Acquire exclusive access for a mutation.
    pub fn exclusive(&self) -> RwLockWriteGuard<'_, ()> {
        if let Some(guard) = self.inner.try_write() {
            self.stats.record_lock_fast_path();
            return guard;
        }
        self.stats.record_lock_wait();
        trace!("Waiting for exclusive content lock");
        self.inner.write()
    }

    /// True if any guard is currently held.
    pub fn is_locked(&self) -> bool {
        self.inner.is_locked()
    }
}
