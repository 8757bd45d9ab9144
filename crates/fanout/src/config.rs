// Dispatch configuration
//
// Batch-level knobs (pool sizing, worker recycling, retry policy) resolved
// from environment variables, with builder overrides on top.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::pool::WorkerPoolConfig;
use crate::retry::RetryPolicy;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required variable not set
    #[error("{0} environment variable not set")]
    Missing(&'static str),

    /// Variable set but not parseable
    #[error("invalid value for {name}: {value:?}")]
    Invalid { name: &'static str, value: String },
}

/// Read and parse an optional environment variable
pub(crate) fn env_parse<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match std::env::var(name) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { name, value }),
        Err(_) => Ok(None),
    }
}

/// Everything a batch needs besides the client and the call parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DispatchConfig {
    pub pool: WorkerPoolConfig,
    pub retry: RetryPolicy,
}

impl DispatchConfig {
    /// Create configuration from environment variables
    ///
    /// - `FANOUT_POOL_SIZE`: worker count (default: available parallelism)
    /// - `FANOUT_MAX_TASKS_PER_WORKER`: tasks before a worker is recycled (default: 100, 0 disables)
    /// - `FANOUT_MAX_RETRIES`: attempts per task (default: 3)
    /// - `FANOUT_BACKOFF_BASE_SECS`: base backoff in seconds (default: 0.5)
    /// - `FANOUT_JITTER_SECS`: jitter bound in seconds (default: 0.25)
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut pool = WorkerPoolConfig::default();
        if let Some(size) = env_parse::<usize>("FANOUT_POOL_SIZE")? {
            pool = pool.with_pool_size(size);
        }
        if let Some(max_tasks) = env_parse::<usize>("FANOUT_MAX_TASKS_PER_WORKER")? {
            pool = pool.with_max_tasks_per_worker(max_tasks);
        }

        let mut retry = RetryPolicy::default();
        if let Some(max_retries) = env_parse::<u32>("FANOUT_MAX_RETRIES")? {
            retry = retry.with_max_retries(max_retries);
        }
        if let Some(base) = env_parse::<f64>("FANOUT_BACKOFF_BASE_SECS")? {
            retry = retry.with_backoff_base_secs(base);
        }
        if let Some(jitter) = env_parse::<f64>("FANOUT_JITTER_SECS")? {
            retry = retry.with_jitter_secs(jitter);
        }

        Ok(Self { pool, retry })
    }

    /// Set the worker pool configuration
    pub fn with_pool(mut self, pool: WorkerPoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Set the retry policy
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    // Each test uses its own variable names; the process environment is shared.

    #[test]
    fn test_env_parse_unset() {
        let value: Option<u32> = env_parse("FANOUT_TEST_UNSET_VARIABLE").unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn test_env_parse_invalid() {
        std::env::set_var("FANOUT_TEST_INVALID_VARIABLE", "three");
        let err = env_parse::<u32>("FANOUT_TEST_INVALID_VARIABLE").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { name: "FANOUT_TEST_INVALID_VARIABLE", .. }
        ));
    }

    #[test]
    fn test_env_parse_trims() {
        std::env::set_var("FANOUT_TEST_PADDED_VARIABLE", " 7 ");
        let value: Option<u32> = env_parse("FANOUT_TEST_PADDED_VARIABLE").unwrap();
        assert_eq!(value, Some(7));
    }

    #[test]
    fn test_builder() {
        let config = DispatchConfig::default()
            .with_pool(WorkerPoolConfig::default().with_pool_size(4))
            .with_retry(RetryPolicy::default().with_backoff_base(Duration::from_secs(1)));

        assert_eq!(config.pool.pool_size, Some(4));
        assert_eq!(config.retry.backoff_base, Duration::from_secs(1));
        assert_eq!(config.retry.max_retries, 3);
    }

    // The only test in this crate that touches the FANOUT_* dispatch variables
    #[test]
    fn test_dispatch_config_from_env() {
        std::env::set_var("FANOUT_POOL_SIZE", "4");
        std::env::set_var("FANOUT_MAX_TASKS_PER_WORKER", "0");
        std::env::set_var("FANOUT_MAX_RETRIES", "5");
        std::env::set_var("FANOUT_BACKOFF_BASE_SECS", "1.5");
        std::env::set_var("FANOUT_JITTER_SECS", " ");

        let config = DispatchConfig::from_env().unwrap();
        assert_eq!(config.pool.pool_size, Some(4));
        assert_eq!(config.pool.max_tasks_per_worker, None);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.backoff_base, Duration::from_millis(1500));
        assert_eq!(config.retry.jitter, RetryPolicy::default().jitter);

        std::env::set_var("FANOUT_MAX_RETRIES", "many");
        let err = DispatchConfig::from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { name: "FANOUT_MAX_RETRIES", .. }
        ));

        for name in [
            "FANOUT_POOL_SIZE",
            "FANOUT_MAX_TASKS_PER_WORKER",
            "FANOUT_MAX_RETRIES",
            "FANOUT_BACKOFF_BASE_SECS",
            "FANOUT_JITTER_SECS",
        ] {
            std::env::remove_var(name);
        }
    }
}
