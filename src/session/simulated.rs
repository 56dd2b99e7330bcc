//! Simulated in-memory target
//!
//! Serves a configurable physical region map and answers scatter reads with
//! a deterministic byte pattern, without touching any real device. Every
//! call is counted so tests can check resource balance (contexts opened vs
//! closed), and faults can be injected into `execute` to exercise the worker
//! failure boundary.

use super::{MemorySession, ScatterContext};
use crate::config::SimulatedTargetConfig;
use crate::error::{StressError, Result};
use crate::types::{PhysicalRegion, ProcessTarget, RegionMap};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, trace};

/// Opaque panic payload raised by an injected corruption fault.
///
/// Carries no message, so the worker boundary cannot classify it.
#[derive(Debug, Clone, Copy)]
pub struct ScatterCorruption {
    pub address: u64,
}

/// Call counters of a simulated session
#[derive(Debug, Default)]
pub struct SessionStats {
    pub contexts_opened: AtomicU64,
    pub contexts_closed: AtomicU64,
    pub open_failures: AtomicU64,
    pub prepares: AtomicU64,
    pub executes: AtomicU64,
    pub reads: AtomicU64,
    pub bytes_returned: AtomicU64,
    pub region_maps_issued: AtomicU64,
    pub region_maps_freed: AtomicU64,
}

impl SessionStats {
    pub fn opened(&self) -> u64 {
        self.contexts_opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> u64 {
        self.contexts_closed.load(Ordering::SeqCst)
    }

    pub fn executes(&self) -> u64 {
        self.executes.load(Ordering::SeqCst)
    }

    pub fn region_maps_issued(&self) -> u64 {
        self.region_maps_issued.load(Ordering::SeqCst)
    }

    pub fn region_maps_freed(&self) -> u64 {
        self.region_maps_freed.load(Ordering::SeqCst)
    }
}

/// Session backed by an in-memory target
#[derive(Debug)]
pub struct SimulatedSession {
    /// Regions sorted by base address
    regions: Vec<PhysicalRegion>,
    map_version: u32,
    open_failure_rate: f64,
    fault_rate: f64,
    opaque_fault_rate: f64,
    verbose: bool,
    seed: u64,
    next_context: AtomicU64,
    closed: AtomicBool,
    stats: SessionStats,
}

impl SimulatedSession {
    /// Create a session directly from target settings
    pub fn new(config: &SimulatedTargetConfig) -> Self {
        let mut regions = config.regions.clone();
        regions.sort_by_key(|r| r.base);

        Self {
            regions,
            map_version: config.map_version,
            open_failure_rate: config.open_failure_rate,
            fault_rate: config.fault_rate,
            opaque_fault_rate: config.opaque_fault_rate,
            verbose: false,
            seed: rand::random(),
            next_context: AtomicU64::new(0),
            closed: AtomicBool::new(false),
            stats: SessionStats::default(),
        }
    }

    /// Open from startup args, mirroring a real device handshake
    pub fn open(args: &[String], config: &SimulatedTargetConfig) -> Result<Self> {
        let mut session = Self::new(config);

        for arg in args {
            match arg.as_str() {
                "-v" | "-printf" => session.verbose = true,
                "-waitinitialize" => {
                    // Nothing to wait for: the simulated target is ready at once.
                }
                _ => {}
            }
        }

        if session.regions.is_empty() {
            return Err(StressError::SessionOpen(
                "simulated target has no physical memory".to_string(),
            ));
        }

        if session.verbose {
            debug!(
                regions = session.regions.len(),
                bytes = session.regions.iter().map(|r| r.length).sum::<u64>(),
                "Simulated target attached"
            );
        }

        Ok(session)
    }

    /// Fix the seed used for fault injection
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn region_for(&self, address: u64) -> Option<&PhysicalRegion> {
        let idx = self.regions.partition_point(|r| r.base <= address);
        idx.checked_sub(1)
            .map(|i| &self.regions[i])
            .filter(|r| r.contains(address))
    }

    fn context_rng(&self) -> StdRng {
        let n = self.next_context.fetch_add(1, Ordering::Relaxed);
        StdRng::seed_from_u64(self.seed ^ n.wrapping_mul(0x9e37_79b9_7f4a_7c15))
    }
}

/// Byte served for a physical address
pub fn pattern_byte(address: u64) -> u8 {
    ((address >> 12) as u8) ^ (address as u8)
}

impl MemorySession for SimulatedSession {
    fn name(&self) -> &str {
        "simulated"
    }

    fn physical_regions(&self) -> Result<RegionMap> {
        if self.is_closed() {
            return Err(StressError::RegionMap("session is closed".to_string()));
        }
        self.stats.region_maps_issued.fetch_add(1, Ordering::SeqCst);
        Ok(RegionMap {
            version: self.map_version,
            regions: self.regions.clone(),
        })
    }

    fn free_region_map(&self, map: RegionMap) {
        self.stats.region_maps_freed.fetch_add(1, Ordering::SeqCst);
        drop(map);
    }

    fn open_scatter(
        &self,
        target: ProcessTarget,
        bypass_cache: bool,
    ) -> Option<Box<dyn ScatterContext + '_>> {
        if self.is_closed() {
            self.stats.open_failures.fetch_add(1, Ordering::SeqCst);
            return None;
        }

        let mut rng = self.context_rng();
        if self.open_failure_rate > 0.0 && rng.gen_bool(self.open_failure_rate) {
            self.stats.open_failures.fetch_add(1, Ordering::SeqCst);
            return None;
        }

        self.stats.contexts_opened.fetch_add(1, Ordering::SeqCst);
        trace!(%target, bypass_cache, "Scatter context opened");

        Some(Box::new(SimulatedScatter {
            session: self,
            prepared: HashMap::new(),
            executed: false,
            rng,
        }))
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("Simulated session closed");
        }
    }
}

struct SimulatedScatter<'a> {
    session: &'a SimulatedSession,
    prepared: HashMap<u64, u32>,
    executed: bool,
    rng: StdRng,
}

impl SimulatedScatter<'_> {
    fn inject_fault(&mut self) {
        let opaque = self.session.opaque_fault_rate;
        let recognized = self.session.fault_rate;
        if opaque <= 0.0 && recognized <= 0.0 {
            return;
        }

        let address = self.prepared.keys().next().copied().unwrap_or(0);
        let roll: f64 = self.rng.gen();
        if roll < opaque {
            std::panic::panic_any(ScatterCorruption { address });
        }
        if roll < opaque + recognized {
            panic!("simulated scatter fault at {:#x}", address);
        }
    }
}

impl ScatterContext for SimulatedScatter<'_> {
    fn prepare(&mut self, address: u64, len: u32) -> bool {
        self.session.stats.prepares.fetch_add(1, Ordering::Relaxed);
        if self.executed || len == 0 || self.session.region_for(address).is_none() {
            return false;
        }
        let entry = self.prepared.entry(address).or_insert(0);
        *entry = (*entry).max(len);
        true
    }

    fn execute(&mut self) -> bool {
        self.session.stats.executes.fetch_add(1, Ordering::SeqCst);
        self.inject_fault();
        self.executed = true;
        !self.prepared.is_empty()
    }

    fn read(&mut self, address: u64, buf: &mut [u8]) -> u32 {
        self.session.stats.reads.fetch_add(1, Ordering::Relaxed);
        if !self.executed {
            return 0;
        }
        let Some(&prepared) = self.prepared.get(&address) else {
            return 0;
        };
        let Some(region) = self.session.region_for(address) else {
            return 0;
        };

        let available = region.end() - address;
        let n = (buf.len() as u64).min(prepared as u64).min(available) as usize;
        for (i, byte) in buf[..n].iter_mut().enumerate() {
            *byte = pattern_byte(address + i as u64);
        }

        self.session
            .stats
            .bytes_returned
            .fetch_add(n as u64, Ordering::Relaxed);
        n as u32
    }

    fn close(self: Box<Self>) {
        self.session
            .stats
            .contexts_closed
            .fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_target() -> SimulatedTargetConfig {
        SimulatedTargetConfig {
            regions: vec![
                PhysicalRegion::new(0x10_0000, 0x4000),
                PhysicalRegion::new(0x1000, 0x2000),
            ],
            ..SimulatedTargetConfig::default()
        }
    }

    #[test]
    fn test_regions_are_sorted() {
        let session = SimulatedSession::new(&small_target());
        let map = session.physical_regions().unwrap();
        assert_eq!(map.regions[0].base, 0x1000);
        assert_eq!(map.regions[1].base, 0x10_0000);
    }

    #[test]
    fn test_prepare_execute_read() {
        let session = SimulatedSession::new(&small_target());
        let mut ctx = session.open_scatter(ProcessTarget::AllProcesses, false).unwrap();

        assert!(ctx.prepare(0x1000, 16));
        assert!(!ctx.prepare(0x5000, 16), "outside every region");

        let mut buf = [0u8; 64];
        assert_eq!(ctx.read(0x1000, &mut buf), 0, "read before execute");

        assert!(ctx.execute());
        assert_eq!(ctx.read(0x1000, &mut buf), 16);
        assert_eq!(buf[1], pattern_byte(0x1001));
        assert_eq!(ctx.read(0x2000, &mut buf), 0, "never prepared");

        ctx.close();
        assert_eq!(session.stats().opened(), 1);
        assert_eq!(session.stats().closed(), 1);
    }

    #[test]
    fn test_read_truncated_at_region_end() {
        let session = SimulatedSession::new(&small_target());
        let mut ctx = session.open_scatter(ProcessTarget::AllProcesses, true).unwrap();

        assert!(ctx.prepare(0x2f00, 0x1000));
        ctx.execute();
        let mut buf = vec![0u8; 0x1000];
        assert_eq!(ctx.read(0x2f00, &mut buf), 0x100);
        ctx.close();
    }

    #[test]
    fn test_open_failure_injection() {
        let config = SimulatedTargetConfig {
            open_failure_rate: 1.0,
            ..small_target()
        };
        let session = SimulatedSession::new(&config);
        assert!(session
            .open_scatter(ProcessTarget::AllProcesses, false)
            .is_none());
        assert_eq!(session.stats().open_failures.load(Ordering::SeqCst), 1);
        assert_eq!(session.stats().opened(), 0);
    }

    #[test]
    fn test_opaque_fault_payload() {
        let config = SimulatedTargetConfig {
            opaque_fault_rate: 1.0,
            ..small_target()
        };
        let session = SimulatedSession::new(&config).with_seed(1);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let mut ctx = session.open_scatter(ProcessTarget::AllProcesses, false).unwrap();
            ctx.prepare(0x1000, 8);
            ctx.execute();
        }));

        let payload = result.unwrap_err();
        assert!(payload.downcast_ref::<ScatterCorruption>().is_some());
    }

    #[test]
    fn test_closed_session_refuses_work() {
        let session = SimulatedSession::new(&small_target());
        session.close();
        assert!(session.is_closed());
        assert!(session.physical_regions().is_err());
        assert!(session
            .open_scatter(ProcessTarget::AllProcesses, false)
            .is_none());
    }

    #[test]
    fn test_open_rejects_empty_target() {
        let config = SimulatedTargetConfig {
            regions: Vec::new(),
            ..SimulatedTargetConfig::default()
        };
        let result = SimulatedSession::open(&["-device".to_string(), "sim".to_string()], &config);
        assert!(matches!(result, Err(StressError::SessionOpen(_))));
    }
}
