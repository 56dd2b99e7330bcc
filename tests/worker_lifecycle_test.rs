//! Worker population and failure boundary tests on real threads

mod common;

use common::{simulated_session, small_target, wait_for_balanced_contexts, wait_until, worker_env};
use scatter_stress::config::{PerturbationSettings, SimulatedTargetConfig};
use scatter_stress::harness::{
    spawn_long_worker, spawn_transient_worker, GcPauseSimulator, QueueSpawner, ThreadSpawner,
};
use scatter_stress::{Bounds, MemorySession};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn test_transient_population_self_heals() {
    let session = simulated_session(&small_target(), 21);
    let env = worker_env(session.clone(), Arc::new(ThreadSpawner), 21);

    for _ in 0..8 {
        spawn_transient_worker(&env).unwrap();
    }

    // Lifetimes are 10-40ms, so every worker is replaced several times.
    let deadline = Instant::now() + Duration::from_millis(800);
    let mut max_seen = 0;
    while Instant::now() < deadline {
        let active = env.ctx.counters.active_workers();
        assert!(active >= 0);
        max_seen = max_seen.max(active);
        thread::sleep(Duration::from_millis(1));
    }
    assert!(max_seen <= 8, "population grew to {}", max_seen);
    assert!(env.ctx.counters.snapshot().respawns >= 8);

    assert!(
        wait_until(Duration::from_secs(5), || env.ctx.counters.active_workers() == 8),
        "population never returned to 8"
    );

    env.cancel.cancel();
    assert!(
        wait_until(Duration::from_secs(5), || env.ctx.counters.active_workers() == 0),
        "transient workers must leave the count when cancelled"
    );

    session.close();
    assert!(wait_for_balanced_contexts(&session, Duration::from_secs(5)));
}

#[test]
fn test_queued_transient_population_is_constant() {
    let session = simulated_session(&small_target(), 22);
    let spawner = Arc::new(QueueSpawner::new());
    let env = worker_env(session.clone(), spawner.clone(), 22);

    for _ in 0..8 {
        spawn_transient_worker(&env).unwrap();
    }

    for round in 0..40 {
        assert_eq!(spawner.pending(), 8, "round {}", round);
        spawner.run_next().unwrap();
        assert_eq!(env.ctx.counters.active_workers(), 0);
    }

    let snapshot = env.ctx.counters.snapshot();
    assert_eq!(snapshot.respawns, 40);
    assert!(snapshot.iterations > 0);
    assert_eq!(session.stats().opened(), session.stats().closed());
}

#[test]
fn test_long_workers_survive_faults() {
    let target = SimulatedTargetConfig {
        fault_rate: 0.3,
        opaque_fault_rate: 0.2,
        open_failure_rate: 0.1,
        ..small_target()
    };
    let session = simulated_session(&target, 23);
    let env = worker_env(session.clone(), Arc::new(ThreadSpawner), 23);

    for _ in 0..4 {
        spawn_long_worker(&env).unwrap();
    }

    assert!(wait_until(Duration::from_secs(10), || {
        let s = env.ctx.counters.snapshot();
        s.crash_count > 0 && s.recoverable_faults > 0 && s.iterations > 0 && s.skipped_iterations > 0
    }));
    assert_eq!(env.ctx.counters.active_workers(), 4);

    env.cancel.cancel();
    session.close();
    assert!(wait_for_balanced_contexts(&session, Duration::from_secs(5)));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(session.stats().opened(), session.stats().closed());

    // Long workers never leave the count, even after cancellation.
    assert_eq!(env.ctx.counters.active_workers(), 4);
}

#[test]
fn test_mixed_population_under_gc_pauses() {
    let session = simulated_session(&small_target(), 24);
    let env = worker_env(session.clone(), Arc::new(ThreadSpawner), 24);

    let settings = PerturbationSettings {
        gc_interval_ms: Bounds::new(1, 3),
        gc_pause_ms: Bounds::new(1, 2),
        ..PerturbationSettings::default()
    };
    let gc = {
        let ctx = Arc::clone(&env.ctx);
        let rng = ctx.thread_rng();
        let cancel = env.cancel.clone();
        thread::spawn(move || GcPauseSimulator::new(&settings).run(&ctx, rng, cancel))
    };

    for _ in 0..4 {
        spawn_long_worker(&env).unwrap();
        spawn_transient_worker(&env).unwrap();
    }

    assert!(wait_until(Duration::from_secs(10), || {
        let s = env.ctx.counters.snapshot();
        s.gc_pauses >= 20 && s.respawns >= 4
    }));
    assert_eq!(env.ctx.counters.crashes(), 0);

    env.cancel.cancel();
    gc.join().unwrap();
    assert!(!env.ctx.is_paused());
    assert!(wait_until(Duration::from_secs(5), || {
        env.ctx.counters.active_workers() == 4
    }));
}
