//! Scatter-read workload
//!
//! One call to [`WorkloadExecutor::run_once`] drives a complete batched read
//! against the session: sample pages, open a context, prepare every read,
//! execute once, read every result back, close. Safepoint checks sit at each
//! protocol transition and every `safepoint_every` prepares/reads.
//!
//! The prepare loop finishes queueing the whole batch before `execute` is
//! called. The window between the last prepare and `execute` must stay open.

use super::context::HarnessContext;
use super::pool::AddressPool;
use super::safepoint;
use crate::config::WorkloadConfig;
use crate::session::{MemorySession, ScatterContext};
use crate::types::{AddressableUnit, ProcessTarget};
use rand::Rng;
use tracing::trace;

/// One queued read of a scatter request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScatterEntry {
    pub unit: AddressableUnit,
    /// Byte count passed to prepare
    pub desired: u32,
    /// Whether the session accepted the prepare
    pub accepted: bool,
    /// Bytes returned by the read-back
    pub bytes_read: u32,
}

/// Per-iteration scatter request.
///
/// Owns the session's scatter context and closes it when dropped, so the
/// context is released on every exit path of an iteration, including a
/// panic unwinding out of `execute`.
pub struct ScatterRequest<'s> {
    context: Option<Box<dyn ScatterContext + 's>>,
    entries: Vec<ScatterEntry>,
}

impl<'s> ScatterRequest<'s> {
    /// Open a context; `None` when the session refuses
    pub fn open(
        session: &'s dyn MemorySession,
        target: ProcessTarget,
        bypass_cache: bool,
    ) -> Option<Self> {
        session.open_scatter(target, bypass_cache).map(|context| Self {
            context: Some(context),
            entries: Vec::new(),
        })
    }

    /// Queue a read of `desired` bytes at `unit.base`
    pub fn prepare(&mut self, unit: AddressableUnit, desired: u32) -> bool {
        let accepted = match self.context.as_mut() {
            Some(ctx) => ctx.prepare(unit.base, desired),
            None => false,
        };
        self.entries.push(ScatterEntry {
            unit,
            desired,
            accepted,
            bytes_read: 0,
        });
        accepted
    }

    /// Execute every queued read in one call
    pub fn execute(&mut self) -> bool {
        match self.context.as_mut() {
            Some(ctx) => ctx.execute(),
            None => false,
        }
    }

    /// Read back entry `index` into `buf`
    pub fn read(&mut self, index: usize, buf: &mut [u8]) -> u32 {
        let (Some(ctx), Some(entry)) = (self.context.as_mut(), self.entries.get_mut(index)) else {
            return 0;
        };
        let n = ctx.read(entry.unit.base, buf);
        entry.bytes_read = n;
        n
    }

    pub fn entries(&self) -> &[ScatterEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Close the context now instead of at drop
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(ctx) = self.context.take() {
            ctx.close();
        }
    }
}

impl Drop for ScatterRequest<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Summary of one workload iteration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IterationReport {
    pub bypass_cache: bool,
    pub batch_size: usize,
    /// False when the scatter context could not be opened
    pub context_opened: bool,
    /// Prepares the session accepted
    pub accepted: usize,
    pub executed: bool,
    pub bytes_read: u64,
}

/// Drives scatter-read iterations against one session
pub struct WorkloadExecutor<'a> {
    session: &'a dyn MemorySession,
    pool: &'a AddressPool,
    ctx: &'a HarnessContext,
    config: &'a WorkloadConfig,
    target: ProcessTarget,
}

impl<'a> WorkloadExecutor<'a> {
    pub fn new(
        session: &'a dyn MemorySession,
        pool: &'a AddressPool,
        ctx: &'a HarnessContext,
        config: &'a WorkloadConfig,
        target: ProcessTarget,
    ) -> Self {
        Self {
            session,
            pool,
            ctx,
            config,
            target,
        }
    }

    fn safepoint_due(&self, index: usize) -> bool {
        (index + 1) % self.config.safepoint_every == 0
    }

    /// Run one complete iteration. No state survives the call.
    pub fn run_once<R: Rng + ?Sized>(&self, rng: &mut R) -> IterationReport {
        let bypass_cache = rng.gen_bool(0.5);
        let batch_size = self.config.batch_size.sample(rng);
        let units = self.pool.sample(rng, batch_size);

        let mut report = IterationReport {
            bypass_cache,
            batch_size,
            ..IterationReport::default()
        };

        // Pre-open
        safepoint::check(self.ctx, rng);

        let Some(mut request) = ScatterRequest::open(self.session, self.target, bypass_cache)
        else {
            trace!(batch_size, "Scatter context unavailable, skipping iteration");
            return report;
        };
        report.context_opened = true;

        // Post-open
        safepoint::check(self.ctx, rng);

        for (i, unit) in units.into_iter().enumerate() {
            let desired = self.config.desired_bytes.sample(rng);
            if request.prepare(unit, desired) {
                report.accepted += 1;
            }
            if self.safepoint_due(i) {
                safepoint::check(self.ctx, rng);
            }
        }

        // Pre-execute: the most timing-sensitive transition.
        safepoint::check(self.ctx, rng);

        report.executed = request.execute();

        // Post-execute
        safepoint::check(self.ctx, rng);

        for i in 0..request.len() {
            let want = request.entries()[i].desired.min(self.config.read_cap);
            let mut buffer = vec![0u8; want as usize];
            let n = request.read(i, &mut buffer);
            if n > 0 {
                std::hint::black_box(buffer[0]);
                report.bytes_read += n as u64;
            }
            if self.safepoint_due(i) {
                safepoint::check(self.ctx, rng);
            }
        }

        request.close();

        trace!(
            batch_size,
            accepted = report.accepted,
            bytes = report.bytes_read,
            bypass_cache,
            "Iteration complete"
        );
        report
    }
}
