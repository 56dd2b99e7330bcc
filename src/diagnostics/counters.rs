//! Worker and crash instrumentation
//!
//! `total_workers` and `crash_count` are the harness's primary output. The
//! remaining counters are advisory and only feed the status line and logs.
//! All updates are relaxed atomics: values are approximately consistent,
//! which is all a status reporter needs.

use serde::Serialize;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Process-wide worker counters (thread-safe)
#[derive(Debug, Default)]
pub struct WorkerCounters {
    /// Workers currently inside their run loop
    pub total_workers: AtomicI64,

    /// Iterations that ended in an unrecognized fault
    pub crash_count: AtomicI64,

    /// Iterations that ran to completion
    pub iterations: AtomicU64,

    /// Iterations skipped because no scatter context could be opened
    pub skipped_iterations: AtomicU64,

    /// Iterations that ended in a recognized fault
    pub recoverable_faults: AtomicU64,

    /// Transient workers started as successors
    pub respawns: AtomicU64,

    /// Completed simulated GC pauses
    pub gc_pauses: AtomicU64,
}

impl WorkerCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn worker_started(&self) {
        self.total_workers.fetch_add(1, Ordering::Relaxed);
    }

    pub fn worker_stopped(&self) {
        self.total_workers.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_crash(&self) {
        self.crash_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_iteration(&self) {
        self.iterations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skip(&self) {
        self.skipped_iterations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_recoverable_fault(&self) {
        self.recoverable_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_respawn(&self) {
        self.respawns.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_gc_pause(&self) {
        self.gc_pauses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn active_workers(&self) -> i64 {
        self.total_workers.load(Ordering::Relaxed)
    }

    pub fn crashes(&self) -> i64 {
        self.crash_count.load(Ordering::Relaxed)
    }

    /// Get current counter snapshot
    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            active_workers: self.total_workers.load(Ordering::Relaxed),
            crash_count: self.crash_count.load(Ordering::Relaxed),
            iterations: self.iterations.load(Ordering::Relaxed),
            skipped_iterations: self.skipped_iterations.load(Ordering::Relaxed),
            recoverable_faults: self.recoverable_faults.load(Ordering::Relaxed),
            respawns: self.respawns.load(Ordering::Relaxed),
            gc_pauses: self.gc_pauses.load(Ordering::Relaxed),
        }
    }
}

/// Counter snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub active_workers: i64,
    pub crash_count: i64,
    pub iterations: u64,
    pub skipped_iterations: u64,
    pub recoverable_faults: u64,
    pub respawns: u64,
    pub gc_pauses: u64,
}
