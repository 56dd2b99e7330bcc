//! Memory-access session capability interface
//!
//! The harness treats the memory-access backend as an opaque collaborator
//! and only ever calls it through [`MemorySession`] and [`ScatterContext`].
//!
//! # Concurrency precondition
//!
//! One session handle is shared by every worker thread and no lock is taken
//! around session calls: implementations must tolerate concurrent scatter
//! contexts opened, executed and closed from many threads at once. The
//! requirement is stated on the trait (`Send + Sync`), not enforced by the
//! caller.

pub mod simulated;

use crate::config::SessionConfig;
use crate::error::{StressError, Result};
use crate::types::{ProcessTarget, RegionMap};
use std::sync::Arc;
use tracing::{debug, info};

pub use simulated::{ScatterCorruption, SessionStats, SimulatedSession};

/// A connected memory-access session
pub trait MemorySession: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Physical memory map of the target
    fn physical_regions(&self) -> Result<RegionMap>;

    /// Release a map obtained from `physical_regions`
    fn free_region_map(&self, map: RegionMap) {
        drop(map);
    }

    /// Open a scatter-read context; `None` means the open failed
    fn open_scatter(
        &self,
        target: ProcessTarget,
        bypass_cache: bool,
    ) -> Option<Box<dyn ScatterContext + '_>>;

    /// Tear down the session
    fn close(&self);
}

/// One batched read: prepare addresses, execute once, then read results
pub trait ScatterContext {
    /// Register a read of `len` bytes at `address`. Best effort.
    fn prepare(&mut self, address: u64, len: u32) -> bool;

    /// Transmit every prepared read as one batch
    fn execute(&mut self) -> bool;

    /// Copy the result for `address` into `buf`, returning bytes written
    fn read(&mut self, address: u64, buf: &mut [u8]) -> u32;

    /// Release the context
    fn close(self: Box<Self>);
}

/// Open a session from the startup arguments in `config`.
///
/// The `-device` argument selects the backend. Failure here is fatal to the
/// harness.
pub fn open_session(config: &SessionConfig) -> Result<Arc<dyn MemorySession>> {
    debug!("Opening session with args {:?}", config.startup_args);

    match config.device() {
        Some("sim") | Some("simulated") => {
            let session = SimulatedSession::open(&config.startup_args, &config.simulated)?;
            info!(
                regions = config.simulated.regions.len(),
                "Simulated session initialized"
            );
            Ok(Arc::new(session))
        }
        Some(other) => Err(StressError::SessionOpen(format!(
            "device '{}' is not available in this build",
            other
        ))),
        None => Err(StressError::SessionOpen(
            "missing -device startup argument".to_string(),
        )),
    }
}
