//! Worker threads
//!
//! A worker repeats the scatter-read workload until it is cancelled or its
//! lifecycle says it has expired. Two lifecycles exist:
//!
//! - [`LongWorker`] never expires and never leaves the active count, even
//!   when cancelled
//! - [`TransientWorker`] expires after a random lifetime, decrements the
//!   active count and starts a successor through the spawner, so the
//!   transient population stays constant while threads are continuously
//!   created and destroyed
//!
//! Every iteration runs behind a failure boundary. Panics carrying a message
//! and iteration errors are recoverable: they are logged and the worker
//! moves on. A panic with any other payload means the backend broke in a
//! way the harness cannot describe, which is what `crash_count` measures.

use super::context::HarnessContext;
use super::pool::AddressPool;
use super::spawner::Spawner;
use super::workload::{IterationReport, WorkloadExecutor};
use crate::config::WorkloadConfig;
use crate::error::Result;
use crate::session::MemorySession;
use crate::types::{Bounds, ProcessTarget};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Result of one guarded iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IterationOutcome {
    Completed(IterationReport),
    /// No scatter context could be opened
    Skipped,
    /// Recognized failure, with its message
    RecoverableFault(String),
    /// Panic payload that is neither a message nor an error
    UnrecognizedFault,
}

/// Run one iteration and classify how it ended
pub fn guarded_iteration<F>(iteration: F) -> IterationOutcome
where
    F: FnOnce() -> Result<IterationReport>,
{
    match catch_unwind(AssertUnwindSafe(iteration)) {
        Ok(Ok(report)) if report.context_opened => IterationOutcome::Completed(report),
        Ok(Ok(_)) => IterationOutcome::Skipped,
        Ok(Err(e)) => IterationOutcome::RecoverableFault(e.to_string()),
        Err(payload) => classify_panic(payload.as_ref()),
    }
}

fn classify_panic(payload: &(dyn Any + Send)) -> IterationOutcome {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        IterationOutcome::RecoverableFault((*msg).to_string())
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        IterationOutcome::RecoverableFault(msg.clone())
    } else {
        IterationOutcome::UnrecognizedFault
    }
}

/// Everything a worker thread needs, cloned into each spawned job
#[derive(Clone)]
pub struct WorkerEnv {
    pub ctx: Arc<HarnessContext>,
    pub pool: Arc<AddressPool>,
    pub session: Arc<dyn MemorySession>,
    pub workload: Arc<WorkloadConfig>,
    pub target: ProcessTarget,
    pub transient_lifetime_ms: Bounds<u64>,
    pub spawner: Arc<dyn Spawner>,
    pub cancel: CancellationToken,
}

/// When a worker stops and what it does on the way out
pub trait Lifecycle: Send + Sized + 'static {
    fn label(&self) -> &str;

    /// Called once on the worker's own thread before the first iteration
    fn on_start(&mut self) {}

    /// Checked before every iteration
    fn expired(&self) -> bool;

    /// Called once after the loop ends
    fn retire(self, env: &WorkerEnv);
}

/// Runs until cancelled and stays counted forever
#[derive(Debug)]
pub struct LongWorker {
    label: String,
}

impl LongWorker {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }
}

impl Lifecycle for LongWorker {
    fn label(&self) -> &str {
        &self.label
    }

    fn expired(&self) -> bool {
        false
    }

    fn retire(self, _env: &WorkerEnv) {
        debug!(worker = %self.label, "Long worker stopped");
    }
}

/// Runs for a bounded lifetime, then hands over to a successor
#[derive(Debug)]
pub struct TransientWorker {
    label: String,
    lifetime: Duration,
    started: Option<Instant>,
}

impl TransientWorker {
    pub fn new(label: impl Into<String>, lifetime: Duration) -> Self {
        Self {
            label: label.into(),
            lifetime,
            started: None,
        }
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }
}

impl Lifecycle for TransientWorker {
    fn label(&self) -> &str {
        &self.label
    }

    fn on_start(&mut self) {
        self.started = Some(Instant::now());
    }

    fn expired(&self) -> bool {
        self.started
            .map(|t| t.elapsed() > self.lifetime)
            .unwrap_or(false)
    }

    fn retire(self, env: &WorkerEnv) {
        env.ctx.counters.worker_stopped();

        if env.cancel.is_cancelled() {
            debug!(worker = %self.label, "Transient worker stopped");
            return;
        }

        match spawn_transient_worker(env) {
            Ok(successor) => {
                env.ctx.counters.record_respawn();
                debug!(worker = %self.label, %successor, "Transient worker replaced");
            }
            Err(e) => {
                error!(worker = %self.label, "Failed to spawn successor: {}", e);
            }
        }
    }
}

/// Worker body: count in, iterate, retire
pub fn run_worker<L: Lifecycle>(mut lifecycle: L, env: WorkerEnv) {
    lifecycle.on_start();
    env.ctx.counters.worker_started();

    let mut rng = env.ctx.thread_rng();
    let executor = WorkloadExecutor::new(
        env.session.as_ref(),
        &env.pool,
        &env.ctx,
        &env.workload,
        env.target,
    );

    while !env.cancel.is_cancelled() && !lifecycle.expired() {
        match guarded_iteration(|| Ok(executor.run_once(&mut rng))) {
            IterationOutcome::Completed(_) => env.ctx.counters.record_iteration(),
            IterationOutcome::Skipped => env.ctx.counters.record_skip(),
            IterationOutcome::RecoverableFault(msg) => {
                env.ctx.counters.record_recoverable_fault();
                warn!("Exception in {}: {}", lifecycle.label(), msg);
            }
            IterationOutcome::UnrecognizedFault => {
                env.ctx.counters.record_crash();
                error!("Unknown exception in {}!", lifecycle.label());
            }
        }
    }

    lifecycle.retire(&env);
}

/// Start one long worker. Returns its thread name.
pub fn spawn_long_worker(env: &WorkerEnv) -> Result<String> {
    let label = format!("long-worker-{}", env.ctx.next_worker_id());
    let worker = LongWorker::new(label.clone());
    let job_env = env.clone();
    env.spawner
        .spawn(label.clone(), Box::new(move || run_worker(worker, job_env)))?;
    Ok(label)
}

/// Start one transient worker with a freshly drawn lifetime
pub fn spawn_transient_worker(env: &WorkerEnv) -> Result<String> {
    let label = format!("transient-worker-{}", env.ctx.next_worker_id());
    let mut rng = env.ctx.thread_rng();
    let lifetime = Duration::from_millis(env.transient_lifetime_ms.sample(&mut rng));
    let worker = TransientWorker::new(label.clone(), lifetime);
    let job_env = env.clone();
    env.spawner
        .spawn(label.clone(), Box::new(move || run_worker(worker, job_env)))?;
    Ok(label)
}
