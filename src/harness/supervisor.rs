//! Harness supervisor
//!
//! Initializes the session and the address pool, starts every background
//! thread fire-and-forget, then reports the shared counters on a fixed
//! interval until its cancellation token fires.
//!
//! # Lifecycle
//!
//! ```text
//! Initializing --start--> Running --cancel--> Stopped
//! ```
//!
//! The production binary never cancels, so `Stopped` is only reached in
//! tests. Spawned threads are not joined: the supervisor owns nothing but
//! the shared context, the pool and the session handle.

use super::context::HarnessContext;
use super::perturbation::{GcPauseSimulator, MemoryPressureGenerator};
use super::pool::AddressPool;
use super::spawner::Spawner;
use super::worker::{spawn_long_worker, spawn_transient_worker, WorkerEnv};
use crate::config::HarnessConfig;
use crate::diagnostics::{AllocationSnapshot, CounterSnapshot};
use crate::error::{Result, StressError};
use crate::session::{open_session, MemorySession};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Supervisor lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Initializing,
    Running,
    Stopped,
}

/// One periodic status sample
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub timestamp: DateTime<Utc>,
    pub uptime_secs: u64,
    pub counters: CounterSnapshot,
    pub allocations: AllocationSnapshot,
}

impl StatusReport {
    /// Single-line JSON form
    pub fn format_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[Status] Active workers: {}, Crash count: {}",
            self.counters.active_workers, self.counters.crash_count
        )
    }
}

/// Destination of periodic status reports
pub trait StatusSink: Send {
    fn emit(&mut self, report: &StatusReport);
}

/// Prints one line per report on stdout
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink {
    json: bool,
}

impl StdoutSink {
    pub fn new(json: bool) -> Self {
        Self { json }
    }
}

impl StatusSink for StdoutSink {
    fn emit(&mut self, report: &StatusReport) {
        if !self.json {
            println!("{}", report);
            return;
        }
        match report.format_json() {
            Ok(line) => println!("{}", line),
            Err(e) => warn!("Failed to serialize status report: {}", e),
        }
    }
}

/// Top-level orchestrator of the harness
pub struct Supervisor {
    config: HarnessConfig,
    session: Arc<dyn MemorySession>,
    ctx: Arc<HarnessContext>,
    pool: Arc<AddressPool>,
    state: SupervisorState,
    started_at: Option<Instant>,
}

impl Supervisor {
    /// Open the configured session and build the address pool
    pub fn initialize(config: HarnessConfig) -> Result<Self> {
        config.validate()?;
        let session = open_session(&config.session)?;
        Self::with_session(config, session)
    }

    /// Build the address pool from an already open session
    pub fn with_session(config: HarnessConfig, session: Arc<dyn MemorySession>) -> Result<Self> {
        config.validate()?;

        let ctx = Arc::new(HarnessContext::new(
            config.perturbation.safepoint_pause(),
            config.seed,
        ));

        let map = session.physical_regions()?;
        let regions = map.regions.len();
        let pool = AddressPool::build(&map, &mut ctx.thread_rng());
        session.free_region_map(map);
        let pool = pool?;

        println!(
            "Initialized {} session: {} regions, {} pages",
            session.name(),
            regions,
            pool.len()
        );

        Ok(Self {
            config,
            session,
            ctx,
            pool: Arc::new(pool),
            state: SupervisorState::Initializing,
            started_at: None,
        })
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn context(&self) -> &Arc<HarnessContext> {
        &self.ctx
    }

    pub fn pool(&self) -> &AddressPool {
        &self.pool
    }

    /// Start every background thread through `spawner`
    pub fn start(&mut self, spawner: Arc<dyn Spawner>, cancel: &CancellationToken) -> Result<()> {
        if self.state != SupervisorState::Initializing {
            return Err(StressError::Other(format!(
                "supervisor cannot start from {:?}",
                self.state
            )));
        }
        debug!("Starting harness threads");

        let perturbation = &self.config.perturbation;
        for i in 0..perturbation.gc_simulators {
            let simulator = GcPauseSimulator::new(perturbation);
            let ctx = Arc::clone(&self.ctx);
            let rng = ctx.thread_rng();
            let cancel = cancel.clone();
            spawner.spawn(
                format!("gc-simulator-{}", i),
                Box::new(move || simulator.run(&ctx, rng, cancel)),
            )?;
        }
        println!("Started {} GC simulator thread(s)", perturbation.gc_simulators);

        for i in 0..perturbation.pressure_threads {
            let generator = MemoryPressureGenerator::new(perturbation);
            let ctx = Arc::clone(&self.ctx);
            let rng = ctx.thread_rng();
            let cancel = cancel.clone();
            spawner.spawn(
                format!("memory-pressure-{}", i),
                Box::new(move || generator.run(&ctx, rng, cancel)),
            )?;
        }
        println!("Started {} memory pressure threads", perturbation.pressure_threads);

        let env = WorkerEnv {
            ctx: Arc::clone(&self.ctx),
            pool: Arc::clone(&self.pool),
            session: Arc::clone(&self.session),
            workload: Arc::new(self.config.workload.clone()),
            target: self.config.session.target,
            transient_lifetime_ms: self.config.workers.transient_lifetime_ms,
            spawner,
            cancel: cancel.clone(),
        };

        for _ in 0..self.config.workers.long_workers {
            let name = spawn_long_worker(&env)?;
            println!("Started {}", name);
        }
        println!("Started {} long-running workers", self.config.workers.long_workers);

        for _ in 0..self.config.workers.transient_workers {
            let name = spawn_transient_worker(&env)?;
            println!("Started {}", name);
        }
        println!(
            "Started {} short-lived workers",
            self.config.workers.transient_workers
        );

        self.state = SupervisorState::Running;
        self.started_at = Some(Instant::now());
        info!(
            process = %self.config.session.target,
            "Harness running"
        );
        Ok(())
    }

    /// Sample the shared counters
    pub fn status(&self) -> StatusReport {
        StatusReport {
            timestamp: Utc::now(),
            uptime_secs: self
                .started_at
                .map(|t| t.elapsed().as_secs())
                .unwrap_or(0),
            counters: self.ctx.counters.snapshot(),
            allocations: self.ctx.allocations.snapshot(),
        }
    }

    /// Start the harness and report status until `cancel` fires.
    ///
    /// The first report is emitted one full interval after start.
    pub async fn run(
        mut self,
        spawner: Arc<dyn Spawner>,
        cancel: CancellationToken,
        sink: &mut dyn StatusSink,
    ) -> Result<()> {
        self.start(spawner, &cancel)?;

        let period = self.config.reporting.status_interval();
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let report = self.status();
                    debug!(
                        iterations = report.counters.iterations,
                        skipped = report.counters.skipped_iterations,
                        faults = report.counters.recoverable_faults,
                        respawns = report.counters.respawns,
                        gc_pauses = report.counters.gc_pauses,
                        "Worker statistics"
                    );
                    self.ctx.allocations.log_statistics();
                    sink.emit(&report);
                }
            }
        }

        self.shutdown();
        Ok(())
    }

    /// Close the session. Spawned threads observe the cancelled token and
    /// wind down on their own.
    pub fn shutdown(&mut self) {
        if self.state == SupervisorState::Stopped {
            return;
        }
        self.session.close();
        self.state = SupervisorState::Stopped;
        debug!("{}", self.ctx.allocations.snapshot().to_human_readable());
        info!(
            crashes = self.ctx.counters.crashes(),
            "Harness stopped"
        );
    }
}
