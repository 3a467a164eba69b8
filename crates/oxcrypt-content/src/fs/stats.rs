//! I/O and lock contention counters for the content engine.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters shared by every open file of an engine.
///
/// Thread-safe counters using atomic operations for lock-free updates.
#[derive(Debug, Default)]
pub struct ContentStats {
    /// Block records encrypted and stored
    pub blocks_encrypted: AtomicU64,

    /// Block records decrypted and verified
    pub blocks_decrypted: AtomicU64,

    /// Hole blocks served as zeros without decryption
    pub holes_read: AtomicU64,

    /// Partial-block writes that needed read-modify-write
    pub rmw_cycles: AtomicU64,

    /// Records that failed authentication or were malformed
    pub integrity_failures: AtomicU64,

    /// Content lock acquisitions that succeeded without waiting
    pub lock_fast_path: AtomicU64,

    /// Content lock acquisitions that had to wait for another holder
    pub lock_waits: AtomicU64,
}

impl ContentStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_encrypted(&self, blocks: u64) {
        self.blocks_encrypted.fetch_add(blocks, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_decrypted(&self) {
        self.blocks_decrypted.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_hole(&self) {
        self.holes_read.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_rmw(&self) {
        self.rmw_cycles.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_integrity_failure(&self) {
        self.integrity_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_lock_fast_path(&self) {
        self.lock_fast_path.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_lock_wait(&self) {
        self.lock_waits.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current snapshot of the counters
    pub fn snapshot(&self) -> ContentStatsSnapshot {
        ContentStatsSnapshot {
            blocks_encrypted: self.blocks_encrypted.load(Ordering::Relaxed),
            blocks_decrypted: self.blocks_decrypted.load(Ordering::Relaxed),
            holes_read: self.holes_read.load(Ordering::Relaxed),
            rmw_cycles: self.rmw_cycles.load(Ordering::Relaxed),
            integrity_failures: self.integrity_failures.load(Ordering::Relaxed),
            lock_fast_path: self.lock_fast_path.load(Ordering::Relaxed),
            lock_waits: self.lock_waits.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time snapshot of [`ContentStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContentStatsSnapshot {
    pub blocks_encrypted: u64,
    pub blocks_decrypted: u64,
    pub holes_read: u64,
    pub rmw_cycles: u64,
    pub integrity_failures: u64,
    pub lock_fast_path: u64,
    pub lock_waits: u64,
}

impl ContentStatsSnapshot {
    /// Fraction of lock acquisitions that did not wait (0.0 to 1.0)
    pub fn lock_fast_path_rate(&self) -> f64 {
        let total = self.lock_fast_path + self.lock_waits;
        if total == 0 {
            0.0
        } else {
            self.lock_fast_path as f64 / total as f64
        }
    }
}
