//! scatter-stress - thread-churn stress harness
//!
//! Opens a memory-access session, starts the worker population and the
//! timing perturbation threads, then prints a status line every few seconds
//! until the process is killed.

use anyhow::Context;
use clap::Parser;
use scatter_stress::{HarnessConfig, StdoutSink, Supervisor, ThreadSpawner};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "scatter-stress")]
#[command(about = "Stress batched physical-memory reads under GC pauses and thread churn", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults apply when it does not exist)
    #[arg(short, long, env = "SCATTER_STRESS_CONFIG")]
    config: Option<PathBuf>,

    /// Set log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Memory-access device passed as `-device`
    #[arg(long)]
    device: Option<String>,

    /// Number of long-running workers
    #[arg(long)]
    long_workers: Option<usize>,

    /// Number of self-respawning short-lived workers
    #[arg(long)]
    transient_workers: Option<usize>,

    /// Number of memory pressure threads
    #[arg(long)]
    pressure_threads: Option<usize>,

    /// Base seed for every thread RNG
    #[arg(long)]
    seed: Option<u64>,

    /// Print status lines as JSON
    #[arg(long)]
    json_status: bool,
}

impl Cli {
    fn apply(&self, config: &mut HarnessConfig) {
        if let Some(device) = &self.device {
            config.session.set_device(device);
        }
        if let Some(n) = self.long_workers {
            config.workers.long_workers = n;
        }
        if let Some(n) = self.transient_workers {
            config.workers.transient_workers = n;
        }
        if let Some(n) = self.pressure_threads {
            config.perturbation.pressure_threads = n;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if self.json_status {
            config.reporting.json = true;
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();

    let level = match cli.log_level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::new(format!(
        "scatter_stress={}",
        level.as_str().to_lowercase()
    ));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr) // stdout carries the status stream
        .init();

    debug!("scatter-stress v{} starting...", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(cli).await {
        error!("Fatal: {:#}", e);
        eprintln!("Initialization failed: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let path = cli.config.clone().unwrap_or_else(HarnessConfig::default_path);
    let mut config = HarnessConfig::load(&path)
        .with_context(|| format!("loading configuration from {}", path.display()))?;
    cli.apply(&mut config);

    let json = config.reporting.json;
    let supervisor = Supervisor::initialize(config).context("initializing harness")?;

    let mut sink = StdoutSink::new(json);
    supervisor
        .run(Arc::new(ThreadSpawner), CancellationToken::new(), &mut sink)
        .await?;

    Ok(())
}
