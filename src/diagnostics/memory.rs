//! Allocation churn tracking
//!
//! Memory pressure threads report every scratch block they allocate and free
//! here, so the status reporter can show how much churn the harness is
//! generating alongside the worker counters.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::info;

/// Allocation statistics tracker (thread-safe)
#[derive(Debug, Default)]
pub struct AllocationTracker {
    /// Total bytes allocated (cumulative)
    pub total_allocated: AtomicU64,

    /// Bytes currently held by pressure threads
    pub current_usage: AtomicU64,

    /// Peak of `current_usage`
    pub peak_usage: AtomicU64,

    /// Blocks currently held
    pub allocation_count: AtomicUsize,
}

impl AllocationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an allocation
    pub fn record_allocation(&self, bytes: u64) {
        self.total_allocated.fetch_add(bytes, Ordering::Relaxed);
        let current = self.current_usage.fetch_add(bytes, Ordering::Relaxed) + bytes;
        self.allocation_count.fetch_add(1, Ordering::Relaxed);

        // Update peak if needed
        let mut peak = self.peak_usage.load(Ordering::Relaxed);
        while current > peak {
            match self.peak_usage.compare_exchange_weak(
                peak,
                current,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(p) => peak = p,
            }
        }
    }

    /// Record a deallocation
    pub fn record_deallocation(&self, bytes: u64) {
        self.current_usage.fetch_sub(bytes, Ordering::Relaxed);
        self.allocation_count.fetch_sub(1, Ordering::Relaxed);
    }

    /// Get current statistics snapshot
    pub fn snapshot(&self) -> AllocationSnapshot {
        AllocationSnapshot {
            total_allocated: self.total_allocated.load(Ordering::Relaxed),
            current_usage: self.current_usage.load(Ordering::Relaxed),
            peak_usage: self.peak_usage.load(Ordering::Relaxed),
            allocation_count: self.allocation_count.load(Ordering::Relaxed),
        }
    }

    /// Log current allocation statistics
    pub fn log_statistics(&self) {
        let snapshot = self.snapshot();
        info!(
            churned_mb = snapshot.total_allocated / 1_048_576,
            current_kb = snapshot.current_usage / 1024,
            peak_kb = snapshot.peak_usage / 1024,
            blocks = snapshot.allocation_count,
            "Memory pressure statistics"
        );
    }
}

/// Allocation statistics snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AllocationSnapshot {
    pub total_allocated: u64,
    pub current_usage: u64,
    pub peak_usage: u64,
    pub allocation_count: usize,
}

impl AllocationSnapshot {
    /// Convert to human-readable format
    pub fn to_human_readable(&self) -> String {
        format!(
            "Memory Pressure:\n\
             - Churned: {:.2} MB\n\
             - Current: {:.2} MB\n\
             - Peak: {:.2} MB\n\
             - Live Blocks: {}",
            self.total_allocated as f64 / 1_048_576.0,
            self.current_usage as f64 / 1_048_576.0,
            self.peak_usage as f64 / 1_048_576.0,
            self.allocation_count,
        )
    }
}
