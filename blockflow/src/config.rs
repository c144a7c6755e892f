//! Execution configuration.

use crate::errors::BlockflowError;
use serde::{Deserialize, Serialize};
use std::env;

/// Controls how data is partitioned and how much parallelism compositions use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Number of partitions when splitting a single block.
    #[serde(default = "default_n_partitions")]
    pub n_partitions: usize,
    /// Maximum rows per block; `None` means one block per partition.
    #[serde(default)]
    pub block_size: Option<usize>,
    /// Number of parallel jobs for union branches and the thread pool.
    /// `None` uses every available core; `Some(1)` runs sequentially.
    #[serde(default)]
    pub n_jobs: Option<usize>,
    /// Log composition progress at info level.
    #[serde(default)]
    pub verbose: bool,
}

fn default_n_partitions() -> usize {
    4
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            n_partitions: default_n_partitions(),
            block_size: None,
            n_jobs: None,
            verbose: false,
        }
    }
}

impl ExecutionConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads overrides from `BLOCKFLOW_N_PARTITIONS`, `BLOCKFLOW_BLOCK_SIZE`,
    /// `BLOCKFLOW_N_JOBS` and `BLOCKFLOW_VERBOSE`.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but does not parse.
    pub fn from_env() -> Result<Self, BlockflowError> {
        let mut config = Self::default();
        if let Some(n) = read_var("BLOCKFLOW_N_PARTITIONS")? {
            config.n_partitions = n;
        }
        if let Some(n) = read_var("BLOCKFLOW_BLOCK_SIZE")? {
            config.block_size = Some(n);
        }
        if let Some(n) = read_var("BLOCKFLOW_N_JOBS")? {
            config.n_jobs = Some(n);
        }
        if let Ok(v) = env::var("BLOCKFLOW_VERBOSE") {
            config.verbose = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }
        Ok(config)
    }

    /// Sets the partition count.
    #[must_use]
    pub fn with_n_partitions(mut self, n: usize) -> Self {
        self.n_partitions = n;
        self
    }

    /// Sets the block size.
    #[must_use]
    pub fn with_block_size(mut self, block_size: Option<usize>) -> Self {
        self.block_size = block_size;
        self
    }

    /// Sets the job count.
    #[must_use]
    pub fn with_n_jobs(mut self, n_jobs: Option<usize>) -> Self {
        self.n_jobs = n_jobs;
        self
    }

    /// Sets verbosity.
    #[must_use]
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Builds a rayon pool sized by `n_jobs`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool cannot be created.
    pub fn thread_pool(&self) -> Result<rayon::ThreadPool, BlockflowError> {
        let mut builder = rayon::ThreadPoolBuilder::new().thread_name(|i| format!("blockflow-{i}"));
        if let Some(n) = self.n_jobs {
            builder = builder.num_threads(n.max(1));
        }
        builder
            .build()
            .map_err(|e| BlockflowError::Internal(format!("failed to build thread pool: {e}")))
    }
}

fn read_var(name: &str) -> Result<Option<usize>, BlockflowError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| BlockflowError::invalid_input(format!("{name}={raw:?}: {e}"))),
        Err(_) => Ok(None),
    }
}
