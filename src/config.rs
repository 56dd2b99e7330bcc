//! Configuration for the stress harness
//!
//! Every value defaults to the constants of the reference workload, so an
//! absent or empty configuration file reproduces it exactly.
//!
//! # Configuration File Format
//!
//! ```toml
//! seed = 42
//!
//! [session]
//! startup_args = ["-device", "sim", "-waitinitialize", "-printf", "-v"]
//! target = "all_processes"
//!
//! [workers]
//! long_workers = 8
//! transient_workers = 8
//! transient_lifetime_ms = { min = 2000, max = 18000 }
//!
//! [workload]
//! batch_size = { min = 4, max = 4096 }
//! desired_bytes = { min = 4, max = 31457280 }
//!
//! [perturbation]
//! gc_interval_ms = { min = 50, max = 500 }
//! gc_pause_ms = { min = 1, max = 10 }
//! pressure_threads = 4
//!
//! [reporting]
//! status_interval_secs = 5
//! ```

use crate::error::{StressError, Result};
use crate::types::{Bounds, PhysicalRegion, ProcessTarget, PAGE_SIZE, REGION_MAP_VERSION};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Complete harness configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Base seed for every thread RNG; entropy is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Memory-access session settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Worker population settings
    #[serde(default)]
    pub workers: WorkerSettings,

    /// Scatter-read workload shape
    #[serde(default)]
    pub workload: WorkloadConfig,

    /// GC pause and memory pressure settings
    #[serde(default)]
    pub perturbation: PerturbationSettings,

    /// Status reporting settings
    #[serde(default)]
    pub reporting: ReportingSettings,
}

/// Memory-access session settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Arguments handed to the session on open
    pub startup_args: Vec<String>,

    /// Process selector for scatter contexts
    pub target: ProcessTarget,

    /// Simulated target used by the `sim` device
    pub simulated: SimulatedTargetConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            startup_args: default_startup_args(),
            target: ProcessTarget::AllProcesses,
            simulated: SimulatedTargetConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Value following `-device` in the startup args
    pub fn device(&self) -> Option<&str> {
        self.startup_args
            .iter()
            .position(|a| a == "-device")
            .and_then(|i| self.startup_args.get(i + 1))
            .map(String::as_str)
    }

    /// Replace (or append) the `-device` argument
    pub fn set_device(&mut self, device: &str) {
        match self.startup_args.iter().position(|a| a == "-device") {
            Some(i) if i + 1 < self.startup_args.len() => {
                self.startup_args[i + 1] = device.to_string();
            }
            Some(_) => self.startup_args.push(device.to_string()),
            None => {
                self.startup_args.insert(0, device.to_string());
                self.startup_args.insert(0, "-device".to_string());
            }
        }
    }
}

/// In-memory target served by the simulated session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedTargetConfig {
    /// Physical regions the target reports
    pub regions: Vec<PhysicalRegion>,

    /// Version tag put on the region map
    pub map_version: u32,

    /// Probability that opening a scatter context fails
    pub open_failure_rate: f64,

    /// Probability that execute panics with a message
    pub fault_rate: f64,

    /// Probability that execute panics with an opaque payload
    pub opaque_fault_rate: f64,
}

impl Default for SimulatedTargetConfig {
    fn default() -> Self {
        Self {
            regions: vec![
                PhysicalRegion::new(0x1000, 0x9e000),
                PhysicalRegion::new(0x10_0000, 0x4000_0000),
            ],
            map_version: REGION_MAP_VERSION,
            open_failure_rate: 0.0,
            fault_rate: 0.0,
            opaque_fault_rate: 0.0,
        }
    }
}

/// Worker population settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    /// Workers that never retire
    pub long_workers: usize,

    /// Self-respawning workers with bounded lifetimes
    pub transient_workers: usize,

    /// Lifetime range of one transient worker
    pub transient_lifetime_ms: Bounds<u64>,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            long_workers: 8,
            transient_workers: 8,
            transient_lifetime_ms: Bounds::new(2000, 18000),
        }
    }
}

/// Shape of one scatter-read iteration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Units sampled per iteration
    pub batch_size: Bounds<usize>,

    /// Byte count requested per unit at prepare time
    pub desired_bytes: Bounds<u32>,

    /// Upper bound on bytes read back per unit
    pub read_cap: u32,

    /// Safepoint after this many prepares / reads
    pub safepoint_every: usize,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            batch_size: Bounds::new(4, 4096),
            desired_bytes: Bounds::new(4, 0x01e0_0000),
            read_cap: PAGE_SIZE as u32,
            safepoint_every: 100,
        }
    }
}

/// GC-pause and memory-pressure perturbation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerturbationSettings {
    /// Number of GC pause simulator threads
    pub gc_simulators: usize,

    /// Delay between two simulated collections
    pub gc_interval_ms: Bounds<u64>,

    /// How long the pause flag stays raised
    pub gc_pause_ms: Bounds<u64>,

    /// Sleep taken by a safepoint while the pause flag is raised
    pub safepoint_pause_ms: u64,

    /// Number of memory pressure threads
    pub pressure_threads: usize,

    /// Size of one scratch allocation
    pub pressure_block_bytes: Bounds<usize>,

    /// Byte written across every scratch allocation
    pub pressure_fill: u8,
}

impl Default for PerturbationSettings {
    fn default() -> Self {
        Self {
            gc_simulators: 1,
            gc_interval_ms: Bounds::new(50, 500),
            gc_pause_ms: Bounds::new(1, 10),
            safepoint_pause_ms: 1,
            pressure_threads: 4,
            pressure_block_bytes: Bounds::new(1024, 1024 * 1024),
            pressure_fill: 0xaa,
        }
    }
}

impl PerturbationSettings {
    pub fn safepoint_pause(&self) -> Duration {
        Duration::from_millis(self.safepoint_pause_ms)
    }
}

/// Status reporting settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingSettings {
    /// Seconds between two status lines
    pub status_interval_secs: u64,

    /// Emit status lines as JSON instead of text
    pub json: bool,
}

impl Default for ReportingSettings {
    fn default() -> Self {
        Self {
            status_interval_secs: 5,
            json: false,
        }
    }
}

impl ReportingSettings {
    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs)
    }
}

fn default_startup_args() -> Vec<String> {
    ["-device", "sim", "-waitinitialize", "-printf", "-v"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn check_bounds<T>(name: &str, bounds: &Bounds<T>) -> Result<()>
where
    T: rand::distributions::uniform::SampleUniform + PartialOrd + Copy + std::fmt::Debug,
{
    if bounds.is_valid() {
        Ok(())
    } else {
        Err(StressError::InvalidConfig(format!(
            "{}: min {:?} exceeds max {:?}",
            name, bounds.min, bounds.max
        )))
    }
}

fn check_rate(name: &str, rate: f64) -> Result<()> {
    if (0.0..=1.0).contains(&rate) {
        Ok(())
    } else {
        Err(StressError::InvalidConfig(format!(
            "{}: {} is not a probability",
            name, rate
        )))
    }
}

impl HarnessConfig {
    /// Load configuration from file, falling back to defaults if it is missing
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::info!("Config file not found, using defaults: {:?}", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            StressError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read config file: {}", e),
            ))
        })?;

        let config: HarnessConfig = toml::from_str(&content)
            .map_err(|e| StressError::ConfigParse(format!("Failed to parse config file: {}", e)))?;

        tracing::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| StressError::ConfigParse(format!("Failed to serialize config: {}", e)))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;

        tracing::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Reject values the harness cannot run with
    pub fn validate(&self) -> Result<()> {
        check_bounds("workers.transient_lifetime_ms", &self.workers.transient_lifetime_ms)?;
        check_bounds("workload.batch_size", &self.workload.batch_size)?;
        check_bounds("workload.desired_bytes", &self.workload.desired_bytes)?;
        check_bounds("perturbation.gc_interval_ms", &self.perturbation.gc_interval_ms)?;
        check_bounds("perturbation.gc_pause_ms", &self.perturbation.gc_pause_ms)?;
        check_bounds(
            "perturbation.pressure_block_bytes",
            &self.perturbation.pressure_block_bytes,
        )?;

        if self.workload.batch_size.min == 0 {
            return Err(StressError::InvalidConfig(
                "workload.batch_size: min must be at least 1".to_string(),
            ));
        }
        if self.workload.read_cap == 0 {
            return Err(StressError::InvalidConfig(
                "workload.read_cap must be non-zero".to_string(),
            ));
        }
        if self.workload.safepoint_every == 0 {
            return Err(StressError::InvalidConfig(
                "workload.safepoint_every must be non-zero".to_string(),
            ));
        }
        if self.perturbation.pressure_block_bytes.min == 0 {
            return Err(StressError::InvalidConfig(
                "perturbation.pressure_block_bytes: min must be at least 1".to_string(),
            ));
        }
        if self.reporting.status_interval_secs == 0 {
            return Err(StressError::InvalidConfig(
                "reporting.status_interval_secs must be non-zero".to_string(),
            ));
        }

        let sim = &self.session.simulated;
        check_rate("session.simulated.open_failure_rate", sim.open_failure_rate)?;
        check_rate("session.simulated.fault_rate", sim.fault_rate)?;
        check_rate("session.simulated.opaque_fault_rate", sim.opaque_fault_rate)?;

        Ok(())
    }

    /// Default config path, relative to the working directory
    pub fn default_path() -> PathBuf {
        PathBuf::from("scatter-stress.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = HarnessConfig::default();

        assert_eq!(config.workers.long_workers, 8);
        assert_eq!(config.workers.transient_workers, 8);
        assert_eq!(config.workers.transient_lifetime_ms, Bounds::new(2000, 18000));

        assert_eq!(config.workload.batch_size, Bounds::new(4, 4096));
        assert_eq!(config.workload.desired_bytes.max, 0x01e0_0000);
        assert_eq!(config.workload.read_cap, 4096);
        assert_eq!(config.workload.safepoint_every, 100);

        assert_eq!(config.perturbation.gc_simulators, 1);
        assert_eq!(config.perturbation.pressure_threads, 4);
        assert_eq!(config.perturbation.pressure_fill, 0xaa);

        assert_eq!(config.reporting.status_interval_secs, 5);
        assert_eq!(config.session.device(), Some("sim"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("stress.toml");

        let mut config = HarnessConfig::default();
        config.seed = Some(99);
        config.workers.long_workers = 3;
        config.session.target = ProcessTarget::Pid(4);
        config.save(&config_path).unwrap();

        let loaded = HarnessConfig::load(&config_path).unwrap();
        assert_eq!(loaded.seed, Some(99));
        assert_eq!(loaded.workers.long_workers, 3);
        assert_eq!(loaded.session.target, ProcessTarget::Pid(4));
        assert_eq!(loaded.session.simulated.regions, config.session.simulated.regions);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("stress.toml");
        std::fs::write(&config_path, "[workers]\nlong_workers = 2\n").unwrap();

        let loaded = HarnessConfig::load(&config_path).unwrap();
        assert_eq!(loaded.workers.long_workers, 2);
        assert_eq!(loaded.workers.transient_workers, 8);
        assert_eq!(loaded.perturbation.gc_pause_ms, Bounds::new(1, 10));
    }

    #[test]
    fn test_load_nonexistent_returns_default() {
        let config = HarnessConfig::load(Path::new("/nonexistent/stress.toml")).unwrap();
        assert_eq!(config.workers.long_workers, 8);
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("stress.toml");
        std::fs::write(&config_path, "[workers\nlong_workers = ").unwrap();

        let result = HarnessConfig::load(&config_path);
        assert!(matches!(result, Err(StressError::ConfigParse(_))));
    }

    #[test]
    fn test_validate_rejects_inverted_bounds() {
        let mut config = HarnessConfig::default();
        config.perturbation.gc_interval_ms = Bounds::new(500, 50);
        assert!(matches!(
            config.validate(),
            Err(StressError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_rate() {
        let mut config = HarnessConfig::default();
        config.session.simulated.fault_rate = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_set_device() {
        let mut session = SessionConfig::default();
        session.set_device("fpga");
        assert_eq!(session.device(), Some("fpga"));

        let mut bare = SessionConfig {
            startup_args: vec!["-v".to_string()],
            ..SessionConfig::default()
        };
        assert_eq!(bare.device(), None);
        bare.set_device("sim");
        assert_eq!(bare.startup_args, vec!["-device", "sim", "-v"]);
    }
}
