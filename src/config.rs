//! Run configuration: fetch mode, retention, and retriever tuning.
//!
//! Everything here is validated before the first request goes out.

use crate::error::{HarvestError, Result};
use crate::retry::RetryPolicy;
use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time::Duration;

/// Maximum results per page (OpenAlex limit)
pub const MAX_PER_PAGE: usize = 200;

/// Records buffered before a batch file is written
pub const FLUSH_THRESHOLD: usize = 10_000;

/// Pause between successful requests
pub const REQUEST_DELAY: Duration = Duration::from_millis(50);

/// Random seeds are drawn from `0..SEED_SPACE`
pub const SEED_SPACE: u32 = 100_000;

/// How records are selected from the upstream result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum FetchMode {
    /// Walk every page with a cursor
    All,
    /// Draw server-side random samples up to a cap
    Random,
}

impl FromStr for FetchMode {
    type Err = HarvestError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "all" => Ok(FetchMode::All),
            "random" => Ok(FetchMode::Random),
            other => Err(HarvestError::Config(format!(
                "Invalid mode: {}. Must be either 'all' or 'random'",
                other
            ))),
        }
    }
}

/// Fraction of each exhaustive-mode batch kept when writing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Retention(f64);

impl Retention {
    pub const ALL: Retention = Retention(1.0);

    /// Build from a percentage in `(0, 100]`.
    pub fn from_percentage(percentage: f64) -> Result<Self> {
        if !(percentage > 0.0 && percentage <= 100.0) {
            return Err(HarvestError::Config(format!(
                "Percentage must be greater than 0 and at most 100, got {}",
                percentage
            )));
        }
        Ok(Retention(percentage / 100.0))
    }

    pub fn fraction(self) -> f64 {
        self.0
    }

    pub fn keeps_everything(self) -> bool {
        self.0 >= 1.0
    }

    /// Rows kept from a batch of `n`: `floor(n * fraction)`.
    pub fn keep_count(self, n: usize) -> usize {
        if self.keeps_everything() {
            return n;
        }
        ((n as f64) * self.0).floor() as usize
    }
}

impl Default for Retention {
    fn default() -> Self {
        Retention::ALL
    }
}

/// Traversal strategy with its parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mode {
    /// Cursor pagination over the full result set
    Exhaustive { retention: Retention },
    /// Random samples until `cap` records are retrieved
    Sampling { cap: NonZeroUsize },
}

impl Mode {
    /// Validate CLI inputs into a mode.
    ///
    /// Sampling requires a non-zero cap; exhaustive mode requires a
    /// percentage in `(0, 100]`.
    pub fn from_args(
        fetch_mode: FetchMode,
        max_papers: Option<usize>,
        percentage: f64,
    ) -> Result<Self> {
        let retention = Retention::from_percentage(percentage)?;
        match fetch_mode {
            FetchMode::All => Ok(Mode::Exhaustive { retention }),
            FetchMode::Random => {
                let cap = max_papers.ok_or_else(|| {
                    HarvestError::Config(
                        "--max-papers is required when using random mode".to_string(),
                    )
                })?;
                let cap = NonZeroUsize::new(cap).ok_or_else(|| {
                    HarvestError::Config("--max-papers must be greater than 0".to_string())
                })?;
                Ok(Mode::Sampling { cap })
            }
        }
    }
}

/// Tuning knobs for the retriever. `Default` holds the production values.
#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    pub per_page: usize,
    pub flush_threshold: usize,
    pub request_delay: Duration,
    pub seed_space: u32,
    pub retry: RetryPolicy,
    /// Fixed RNG seed for reproducible sampling
    pub rng_seed: Option<u64>,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            per_page: MAX_PER_PAGE,
            flush_threshold: FLUSH_THRESHOLD,
            request_delay: REQUEST_DELAY,
            seed_space: SEED_SPACE,
            retry: RetryPolicy::default(),
            rng_seed: None,
        }
    }
}
