use serde::Deserialize;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{Error, Result};
use crate::utils::RetryConfig;

// ============================================================================
// Benchmark Configuration
// ============================================================================
//
// Defaults can be overridden field by field, from a serde source or from
// BENCH_* environment variables.
//
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    /// Units of work each worker executes
    pub transaction_count: usize,
    /// Events appended (and read back) per unit of work
    pub events_per_transaction: usize,
    /// Workers running concurrently, one stream each
    pub worker_count: usize,
    /// Filler bytes in each event payload
    pub payload_size: usize,
    /// Re-run an iteration that hit a concurrency conflict
    pub retry_conflicts: bool,
    /// Stop starting new iterations after this many seconds
    pub run_timeout_secs: Option<u64>,
    #[serde(skip)]
    pub retry: RetryConfig,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            transaction_count: 100,
            events_per_transaction: 50,
            worker_count: 4,
            payload_size: 64,
            retry_conflicts: false,
            run_timeout_secs: None,
            retry: RetryConfig::default(),
        }
    }
}

impl BenchmarkConfig {
    /// Defaults overridden by BENCH_* environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(value) = parse(&lookup, "BENCH_TRANSACTION_COUNT")? {
            config.transaction_count = value;
        }
        if let Some(value) = parse(&lookup, "BENCH_EVENTS_PER_TRANSACTION")? {
            config.events_per_transaction = value;
        }
        if let Some(value) = parse(&lookup, "BENCH_WORKER_COUNT")? {
            config.worker_count = value;
        }
        if let Some(value) = parse(&lookup, "BENCH_PAYLOAD_SIZE")? {
            config.payload_size = value;
        }
        if let Some(value) = parse(&lookup, "BENCH_RETRY_CONFLICTS")? {
            config.retry_conflicts = value;
        }
        if let Some(value) = parse(&lookup, "BENCH_RUN_TIMEOUT_SECS")? {
            config.run_timeout_secs = Some(value);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.transaction_count == 0 {
            return Err(Error::Config("transaction_count must be positive".to_string()));
        }
        if self.events_per_transaction == 0 {
            return Err(Error::Config("events_per_transaction must be positive".to_string()));
        }
        if self.worker_count == 0 {
            return Err(Error::Config("worker_count must be positive".to_string()));
        }
        if self.retry_conflicts && self.retry.max_attempts == 0 {
            return Err(Error::Config("retry.max_attempts must be positive".to_string()));
        }
        Ok(())
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        self.run_timeout_secs.map(Duration::from_secs)
    }

    /// Retry policy for one iteration: a single attempt unless conflict
    /// retries are switched on
    pub fn retry_policy(&self) -> RetryConfig {
        if self.retry_conflicts {
            self.retry.clone()
        } else {
            RetryConfig::none()
        }
    }
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("{}={:?}: {}", name, raw, e))),
        None => Ok(None),
    }
}
