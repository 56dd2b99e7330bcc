//! Error types for the scatter-stress harness
//!
//! This module provides error handling using thiserror for structured
//! error definitions and anyhow for error propagation in the binary.
//!
//! Every variant here is fatal when it surfaces during initialization.
//! Inside a worker iteration the same errors are downgraded to recoverable
//! faults by the worker boundary and never propagate further.

use thiserror::Error;

/// Main error type for harness operations
#[derive(Error, Debug)]
pub enum StressError {
    /// The memory-access session could not be established
    #[error("Session open failed: {0}")]
    SessionOpen(String),

    /// Fetching the physical region map failed
    #[error("Region map error: {0}")]
    RegionMap(String),

    /// The region map reported an unexpected format version
    #[error("Unexpected region map version: expected {expected}, found {found}")]
    RegionMapVersion { expected: u32, found: u32 },

    /// No addressable units could be carved from the region map
    #[error("Address pool is empty: no region exceeds one page")]
    EmptyPool,

    /// Configuration values are out of range or inconsistent
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be parsed or serialized
    #[error("Configuration parse error: {0}")]
    ConfigParse(String),

    /// I/O error (config files, thread spawning)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Result type alias for harness operations
pub type Result<T> = std::result::Result<T, StressError>;

/// Convert anyhow::Error to StressError
impl From<anyhow::Error> for StressError {
    fn from(err: anyhow::Error) -> Self {
        StressError::Other(err.to_string())
    }
}
