//! Diagnostic instrumentation
//!
//! This module provides the shared counters the harness coordinates through:
//! - Worker population and crash counting
//! - Allocation churn from the memory pressure threads

pub mod counters;
pub mod memory;

pub use counters::{CounterSnapshot, WorkerCounters};
pub use memory::{AllocationSnapshot, AllocationTracker};
