//! Common test utilities and helpers

#![allow(dead_code)]

use scatter_stress::config::SimulatedTargetConfig;
use scatter_stress::harness::{AddressPool, HarnessContext, Spawner, WorkerEnv};
use scatter_stress::{
    Bounds, HarnessConfig, MemorySession, PhysicalRegion, ProcessTarget, SimulatedSession,
    StatusReport, StatusSink, PAGE_SIZE,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Small simulated target: two regions, a few hundred pages
pub fn small_target() -> SimulatedTargetConfig {
    SimulatedTargetConfig {
        regions: vec![
            PhysicalRegion::new(0x1000, PAGE_SIZE * 32),
            PhysicalRegion::new(0x10_0000, PAGE_SIZE * 256),
        ],
        ..SimulatedTargetConfig::default()
    }
}

/// Harness configuration scaled down so tests finish quickly
pub fn fast_config(seed: u64) -> HarnessConfig {
    let mut config = HarnessConfig {
        seed: Some(seed),
        ..HarnessConfig::default()
    };
    config.session.simulated = small_target();
    config.workers.transient_lifetime_ms = Bounds::new(10, 40);
    config.workload.batch_size = Bounds::new(4, 64);
    config.workload.desired_bytes = Bounds::new(4, 8192);
    config.perturbation.gc_interval_ms = Bounds::new(1, 5);
    config.perturbation.pressure_threads = 1;
    config.perturbation.pressure_block_bytes = Bounds::new(1024, 64 * 1024);
    config.reporting.status_interval_secs = 1;
    config
}

/// Open a simulated session over `target` with a fixed fault seed
pub fn simulated_session(target: &SimulatedTargetConfig, seed: u64) -> Arc<SimulatedSession> {
    Arc::new(SimulatedSession::new(target).with_seed(seed))
}

/// Worker environment over `session`, with every shared piece freshly built
pub fn worker_env(
    session: Arc<SimulatedSession>,
    spawner: Arc<dyn Spawner>,
    seed: u64,
) -> WorkerEnv {
    let ctx = Arc::new(HarnessContext::new(Duration::from_millis(1), Some(seed)));
    let map = session.physical_regions().unwrap();
    let pool = AddressPool::build(&map, &mut ctx.thread_rng()).unwrap();
    session.free_region_map(map);

    let config = fast_config(seed);
    WorkerEnv {
        ctx,
        pool: Arc::new(pool),
        session,
        workload: Arc::new(config.workload),
        target: ProcessTarget::AllProcesses,
        transient_lifetime_ms: config.workers.transient_lifetime_ms,
        spawner,
        cancel: CancellationToken::new(),
    }
}

/// Status sink that keeps every report
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub reports: Vec<StatusReport>,
}

impl StatusSink for CollectingSink {
    fn emit(&mut self, report: &StatusReport) {
        self.reports.push(report.clone());
    }
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Wait until every scatter context opened on `session` has been closed
pub fn wait_for_balanced_contexts(session: &SimulatedSession, timeout: Duration) -> bool {
    wait_until(timeout, || {
        let stats = session.stats();
        stats.opened() == stats.closed()
    })
}
