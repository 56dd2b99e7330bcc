//! scatter-stress - thread-churn stress harness for scatter reads
//!
//! Reproduces crashes in a physical-memory access backend that only show up
//! under heavy concurrency: many threads issue batched scatter reads against
//! one shared session while a simulated garbage collector stops the world at
//! random and short-lived worker threads are continuously replaced.
//!
//! # Architecture
//!
//! - **Session**: capability interface to the memory-access backend, plus an
//!   in-memory simulated target
//! - **Harness**: address pool, safepoints, workload, workers, supervisor
//! - **Diagnostics**: worker/crash counters and allocation tracking
//!
//! The harness never stops on its own. Its output is the crash counter in
//! the periodic status line.
//!
//! # Example
//!
//! ```ignore
//! use scatter_stress::{HarnessConfig, StdoutSink, Supervisor, ThreadSpawner};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let supervisor = Supervisor::initialize(HarnessConfig::default())?;
//!     let mut sink = StdoutSink::new(false);
//!     supervisor
//!         .run(Arc::new(ThreadSpawner), CancellationToken::new(), &mut sink)
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod harness;
pub mod session;
pub mod types;

// Re-export commonly used types
pub use config::HarnessConfig;
pub use error::{Result, StressError};
pub use harness::{
    AddressPool, HarnessContext, QueueSpawner, StatusReport, StatusSink, StdoutSink, Supervisor,
    SupervisorState, ThreadSpawner,
};
pub use session::{open_session, MemorySession, ScatterContext, SimulatedSession};
pub use types::{AddressableUnit, Bounds, PhysicalRegion, ProcessTarget, RegionMap, PAGE_SIZE};
