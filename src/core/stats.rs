// src/core/stats.rs

//! Per-session update statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Atomic counters shared by a session and its update tasks.
#[derive(Debug, Default)]
pub struct SessionStats {
    applied: AtomicU64,
    stale: AtomicU64,
    fetch_errors: AtomicU64,
    decode_errors: AtomicU64,
    fatal_faults: AtomicU64,
}

/// A point-in-time copy of `SessionStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub applied: u64,
    pub stale: u64,
    pub fetch_errors: u64,
    pub decode_errors: u64,
    pub fatal_faults: u64,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_applied(&self) {
        self.applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale(&self) {
        self.stale.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_error(&self) {
        self.fetch_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_error(&self) {
        self.decode_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fatal(&self) {
        self.fatal_faults.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads every counter. Counters are independent, so the copy is not a
    /// consistent cut across them.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            applied: self.applied.load(Ordering::Relaxed),
            stale: self.stale.load(Ordering::Relaxed),
            fetch_errors: self.fetch_errors.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            fatal_faults: self.fatal_faults.load(Ordering::Relaxed),
        }
    }
}
