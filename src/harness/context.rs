//! Process-wide harness context
//!
//! Holds the only mutable state shared between threads: the simulated GC
//! pause flag, the worker counters and the allocation tracker. One context
//! is created by the supervisor and handed to every spawned unit by `Arc`,
//! so tests can inject a fresh context instead of touching globals.

use crate::diagnostics::{AllocationTracker, WorkerCounters};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// Shared state every harness thread coordinates through
#[derive(Debug)]
pub struct HarnessContext {
    /// Raised while a simulated collection is in progress
    pause: AtomicBool,

    /// Sleep taken by a safepoint that observes the pause flag
    safepoint_pause: Duration,

    /// Worker population and crash counters
    pub counters: WorkerCounters,

    /// Allocation churn from memory pressure threads
    pub allocations: AllocationTracker,

    seeds: SeedSource,

    next_worker_id: AtomicU64,
}

impl HarnessContext {
    pub fn new(safepoint_pause: Duration, seed: Option<u64>) -> Self {
        Self {
            pause: AtomicBool::new(false),
            safepoint_pause,
            counters: WorkerCounters::new(),
            allocations: AllocationTracker::new(),
            seeds: SeedSource::new(seed.unwrap_or_else(rand::random)),
            next_worker_id: AtomicU64::new(1),
        }
    }

    /// Raise or clear the pause flag
    pub fn set_paused(&self, paused: bool) {
        self.pause.store(paused, Ordering::Release);
    }

    /// Whether a simulated collection is in progress. May be stale.
    pub fn is_paused(&self) -> bool {
        self.pause.load(Ordering::Acquire)
    }

    pub fn safepoint_pause(&self) -> Duration {
        self.safepoint_pause
    }

    /// Ordinal used to name the next spawned worker
    pub fn next_worker_id(&self) -> u64 {
        self.next_worker_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Independent RNG for a newly spawned thread
    pub fn thread_rng(&self) -> StdRng {
        self.seeds.next_rng()
    }
}

/// Derives one RNG stream per spawned thread from a base seed.
///
/// With a fixed base seed the n-th requested stream is always the same,
/// which makes single-threaded tests reproducible.
#[derive(Debug)]
struct SeedSource {
    base: u64,
    next: AtomicU64,
}

impl SeedSource {
    fn new(base: u64) -> Self {
        Self {
            base,
            next: AtomicU64::new(0),
        }
    }

    fn next_rng(&self) -> StdRng {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        StdRng::seed_from_u64(splitmix64(self.base.wrapping_add(n)))
    }
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn test_pause_flag() {
        let ctx = HarnessContext::new(Duration::from_millis(1), Some(1));
        assert!(!ctx.is_paused());
        ctx.set_paused(true);
        assert!(ctx.is_paused());
        ctx.set_paused(false);
        assert!(!ctx.is_paused());
    }

    #[test]
    fn test_seeded_streams_are_reproducible() {
        let a = HarnessContext::new(Duration::ZERO, Some(42));
        let b = HarnessContext::new(Duration::ZERO, Some(42));

        let first_a: u64 = a.thread_rng().gen();
        let first_b: u64 = b.thread_rng().gen();
        assert_eq!(first_a, first_b);

        let second_a: u64 = a.thread_rng().gen();
        assert_ne!(first_a, second_a, "each thread gets its own stream");
    }
}
