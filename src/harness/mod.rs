//! Stress harness core
//!
//! - [`pool`]: page-sized units carved from the target's physical memory
//! - [`safepoint`]: synthetic suspension points
//! - [`workload`]: one batched scatter read per iteration
//! - [`perturbation`]: GC pause simulator and memory pressure threads
//! - [`worker`]: long-running and self-respawning workers
//! - [`supervisor`]: startup and periodic status reporting

pub mod context;
pub mod perturbation;
pub mod pool;
pub mod safepoint;
pub mod spawner;
pub mod supervisor;
pub mod worker;
pub mod workload;

pub use context::HarnessContext;
pub use perturbation::{GcPauseSimulator, MemoryPressureGenerator};
pub use pool::AddressPool;
pub use spawner::{Job, QueueSpawner, Spawner, ThreadSpawner};
pub use supervisor::{StatusReport, StatusSink, StdoutSink, Supervisor, SupervisorState};
pub use worker::{
    guarded_iteration, run_worker, spawn_long_worker, spawn_transient_worker, IterationOutcome,
    Lifecycle, LongWorker, TransientWorker, WorkerEnv,
};
pub use workload::{IterationReport, ScatterEntry, ScatterRequest, WorkloadExecutor};
