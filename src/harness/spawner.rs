//! Thread spawning capability
//!
//! Every thread the harness starts, including the replacement a transient
//! worker launches as it exits, goes through a [`Spawner`]. Production uses
//! detached OS threads; tests swap in [`QueueSpawner`] to run jobs one at a
//! time on the calling thread.

use crate::error::Result;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::thread;
use tracing::trace;

/// Unit of work handed to a spawner
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Starts named, independent units of work
pub trait Spawner: Send + Sync {
    /// Start `job`. Returns once the job is scheduled, not when it finishes.
    fn spawn(&self, name: String, job: Job) -> Result<()>;
}

/// Runs every job on its own detached OS thread
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSpawner;

impl Spawner for ThreadSpawner {
    fn spawn(&self, name: String, job: Job) -> Result<()> {
        trace!(thread = %name, "Spawning thread");
        // Dropping the handle detaches the thread.
        thread::Builder::new().name(name).spawn(job)?;
        Ok(())
    }
}

/// Holds jobs until the owner runs them explicitly
#[derive(Default)]
pub struct QueueSpawner {
    jobs: Mutex<VecDeque<(String, Job)>>,
}

impl QueueSpawner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Jobs waiting to run
    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    /// Names of waiting jobs, oldest first
    pub fn pending_names(&self) -> Vec<String> {
        self.lock().iter().map(|(name, _)| name.clone()).collect()
    }

    /// Run the oldest job on the calling thread. Returns its name.
    ///
    /// The queue is unlocked while the job runs, so it may spawn more jobs.
    pub fn run_next(&self) -> Option<String> {
        let (name, job) = self.lock().pop_front()?;
        job();
        Some(name)
    }

    /// Remove the oldest job without running it
    pub fn take_next(&self) -> Option<(String, Job)> {
        self.lock().pop_front()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<(String, Job)>> {
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Spawner for QueueSpawner {
    fn spawn(&self, name: String, job: Job) -> Result<()> {
        self.lock().push_back((name, job));
        Ok(())
    }
}

impl std::fmt::Debug for QueueSpawner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueSpawner")
            .field("pending", &self.pending())
            .finish()
    }
}
