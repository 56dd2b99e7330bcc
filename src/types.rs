//! Core data types for the scatter-stress harness
//!
//! This module defines the value types shared between the session
//! capability interface and the harness engine.

use rand::distributions::uniform::SampleUniform;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Size of one addressable unit (physical page)
pub const PAGE_SIZE: u64 = 0x1000;

/// Region map format version understood by the address pool
pub const REGION_MAP_VERSION: u32 = 2;

/// One contiguous physical memory region reported by a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhysicalRegion {
    /// Physical base address
    pub base: u64,
    /// Length in bytes
    pub length: u64,
}

impl PhysicalRegion {
    pub const fn new(base: u64, length: u64) -> Self {
        Self { base, length }
    }

    /// Exclusive end address, saturating at `u64::MAX`
    pub fn end(&self) -> u64 {
        self.base.saturating_add(self.length)
    }

    /// Whether `address` falls inside this region
    pub fn contains(&self, address: u64) -> bool {
        address >= self.base && address < self.end()
    }
}

/// Physical memory map returned by `MemorySession::physical_regions`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionMap {
    /// Format version of the map
    pub version: u32,
    /// Reported regions, in the order the session produced them
    pub regions: Vec<PhysicalRegion>,
}

impl RegionMap {
    /// Create a map tagged with the current format version
    pub fn new(regions: Vec<PhysicalRegion>) -> Self {
        Self {
            version: REGION_MAP_VERSION,
            regions,
        }
    }

    /// Total bytes covered by all regions
    pub fn total_bytes(&self) -> u64 {
        self.regions.iter().map(|r| r.length).sum()
    }
}

/// One page-sized unit carved out of a physical region.
///
/// Units are `Copy`: workers always receive them by value, which is what
/// lets the pool be shared across threads without synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressableUnit {
    /// Page-aligned base address
    pub base: u64,
    /// Bytes from `base` to the end of the owning region
    pub remaining_bytes_in_region: u64,
}

/// Process selector passed when opening a scatter context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessTarget {
    /// Physical memory, not bound to any process
    AllProcesses,
    /// A single process by id
    Pid(u32),
}

impl Default for ProcessTarget {
    fn default() -> Self {
        ProcessTarget::AllProcesses
    }
}

impl fmt::Display for ProcessTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessTarget::AllProcesses => write!(f, "all"),
            ProcessTarget::Pid(pid) => write!(f, "pid:{}", pid),
        }
    }
}

/// Inclusive `[min, max]` range used for every randomized parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds<T> {
    pub min: T,
    pub max: T,
}

impl<T> Bounds<T>
where
    T: SampleUniform + PartialOrd + Copy,
{
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }

    /// Uniform draw from the inclusive range
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> T {
        rng.gen_range(self.min..=self.max)
    }

    pub fn is_valid(&self) -> bool {
        self.min <= self.max
    }

    pub fn contains(&self, value: T) -> bool {
        value >= self.min && value <= self.max
    }
}
