//! Timing perturbation threads
//!
//! Two background actors with no output of their own:
//! - the GC pause simulator raises the shared pause flag for a few
//!   milliseconds at random intervals, which every safepoint observes
//! - memory pressure generators allocate, fill and free scratch blocks in a
//!   tight loop, yielding between blocks, to churn the allocator and the
//!   scheduler the way a collecting runtime would
//!
//! Both loop until their cancellation token fires, which production never
//! does.

use super::context::HarnessContext;
use crate::config::PerturbationSettings;
use crate::types::Bounds;
use rand::rngs::StdRng;
use rand::Rng;
use std::thread;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Longest uninterrupted sleep, so cancellation is noticed promptly
const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// Sleep for `duration` in slices, returning false if cancelled meanwhile
pub fn sleep_unless_cancelled(cancel: &CancellationToken, duration: Duration) -> bool {
    let deadline = Instant::now() + duration;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        thread::sleep((deadline - now).min(SLEEP_SLICE));
    }
}

/// Toggles the shared pause flag at random intervals
pub struct GcPauseSimulator {
    interval_ms: Bounds<u64>,
    pause_ms: Bounds<u64>,
}

impl GcPauseSimulator {
    pub fn new(settings: &PerturbationSettings) -> Self {
        Self {
            interval_ms: settings.gc_interval_ms,
            pause_ms: settings.gc_pause_ms,
        }
    }

    /// Run one collection cycle: wait, raise the flag, hold it, clear it
    pub fn cycle(&self, ctx: &HarnessContext, rng: &mut StdRng, cancel: &CancellationToken) -> bool {
        let interval = Duration::from_millis(self.interval_ms.sample(rng));
        if !sleep_unless_cancelled(cancel, interval) {
            return false;
        }

        let pause = Duration::from_millis(self.pause_ms.sample(rng));
        ctx.set_paused(true);
        thread::sleep(pause);
        ctx.set_paused(false);
        ctx.counters.record_gc_pause();
        true
    }

    /// Loop until cancelled
    pub fn run(self, ctx: &HarnessContext, mut rng: StdRng, cancel: CancellationToken) {
        debug!("GC pause simulator running");
        while self.cycle(ctx, &mut rng, &cancel) {}
        ctx.set_paused(false);
        debug!("GC pause simulator stopped");
    }
}

/// Allocates, touches and frees scratch memory continuously
pub struct MemoryPressureGenerator {
    block_bytes: Bounds<usize>,
    fill: u8,
}

impl MemoryPressureGenerator {
    pub fn new(settings: &PerturbationSettings) -> Self {
        Self {
            block_bytes: settings.pressure_block_bytes,
            fill: settings.pressure_fill,
        }
    }

    /// Allocate one filled block, then free it. Returns its size.
    pub fn churn_once(&self, ctx: &HarnessContext, rng: &mut StdRng) -> usize {
        let size = self.block_bytes.sample(rng);
        let block = vec![self.fill; size];
        ctx.allocations.record_allocation(size as u64);
        std::hint::black_box(&block);
        drop(block);
        ctx.allocations.record_deallocation(size as u64);
        size
    }

    /// Loop until cancelled
    pub fn run(self, ctx: &HarnessContext, mut rng: StdRng, cancel: CancellationToken) {
        debug!("Memory pressure generator running");
        while !cancel.is_cancelled() {
            self.churn_once(ctx, &mut rng);
            thread::yield_now();
        }
        debug!("Memory pressure generator stopped");
    }
}
