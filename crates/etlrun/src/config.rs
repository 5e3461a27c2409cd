//! Harness configuration.

use etlcode::DEFAULT_CHUNK_SIZE;

use crate::error::ConfigError;

pub const ENV_CHUNK_SIZE: &str = "ETL_CHUNK_SIZE";
pub const ENV_MAX_CONCURRENCY: &str = "ETL_MAX_CONCURRENCY";

const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Bytes per chunk when a whole object is fed to a streaming pipeline.
    /// `0` hands the object over as a single chunk.
    pub(crate) chunk_size: usize,
    /// Requests served at once. Never below 1.
    pub(crate) max_concurrent_requests: usize,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
        }
    }
}

impl HarnessConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Zero is raised to 1, from here and from `ETL_MAX_CONCURRENCY` alike.
    pub fn max_concurrent_requests(mut self, n: usize) -> Self {
        self.max_concurrent_requests = n.max(1);
        self
    }

    /// Defaults overridden by `ETL_CHUNK_SIZE` and `ETL_MAX_CONCURRENCY`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Like [`HarnessConfig::from_env`], reading variables through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(n) = parse(&lookup, ENV_CHUNK_SIZE)? {
            config = config.chunk_size(n);
        }
        if let Some(n) = parse(&lookup, ENV_MAX_CONCURRENCY)? {
            config = config.max_concurrent_requests(n);
        }
        Ok(config)
    }
}

fn parse(lookup: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<Option<usize>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError { var, value }),
    }
}
