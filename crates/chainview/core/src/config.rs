//! Runtime configuration of the chainview service.

use serde::{Deserialize, Serialize};
use std::{num::NonZeroUsize, time::Duration};
use thiserror::Error;

/// Default capacity of the block cache, in logical blocks.
pub const DEFAULT_BLOCK_CACHE_CAPACITY: NonZeroUsize = NonZeroUsize::new(100).unwrap();

/// Default capacity of the transaction cache.
pub const DEFAULT_TRANSACTION_CACHE_CAPACITY: NonZeroUsize = NonZeroUsize::new(1_000).unwrap();

/// Default number of addresses kept in the balance cache.
pub const DEFAULT_BALANCE_CACHE_CAPACITY: NonZeroUsize = NonZeroUsize::new(10_000).unwrap();

/// Number of blocks a coinstake output needs before it matures.
pub const DEFAULT_MATURITY_WINDOW: u32 = 2_000;

/// Errors raised by [`Config::validate`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The upstream url is empty.
    #[error("upstream url must not be empty")]
    MissingUpstream,
    /// A queue or pool size is zero.
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// Configuration of the chainview service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// WebSocket url of the upstream node event source.
    pub upstream_url: String,
    /// Logical blocks kept in the block cache.
    pub block_cache_capacity: NonZeroUsize,
    /// Transactions kept in the transaction cache.
    pub transaction_cache_capacity: NonZeroUsize,
    /// Addresses kept in the balance cache.
    pub balance_cache_capacity: NonZeroUsize,
    /// Staking maturity window, in blocks.
    pub maturity_window: u32,
    /// Period of the slow statistics refresh.
    pub refresh_interval: Duration,
    /// Workers consuming refresh jobs.
    pub refresh_workers: usize,
    /// Notifications buffered per real-time subscriber before dropping.
    pub subscriber_buffer: usize,
    /// Upstream events buffered ahead of the synchronizer.
    pub event_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            upstream_url: "ws://127.0.0.1:3001".to_string(),
            block_cache_capacity: DEFAULT_BLOCK_CACHE_CAPACITY,
            transaction_cache_capacity: DEFAULT_TRANSACTION_CACHE_CAPACITY,
            balance_cache_capacity: DEFAULT_BALANCE_CACHE_CAPACITY,
            maturity_window: DEFAULT_MATURITY_WINDOW,
            refresh_interval: Duration::from_secs(120),
            refresh_workers: 2,
            subscriber_buffer: 256,
            event_buffer: 1_024,
        }
    }
}

impl Config {
    /// Checks the values that cannot be expressed in the field types.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.upstream_url.trim().is_empty() {
            return Err(ConfigError::MissingUpstream);
        }
        for (name, value) in [
            ("refresh_workers", self.refresh_workers),
            ("subscriber_buffer", self.subscriber_buffer),
            ("event_buffer", self.event_buffer),
        ] {
            if value == 0 {
                return Err(ConfigError::Zero(name));
            }
        }
        if self.refresh_interval.is_zero() {
            return Err(ConfigError::Zero("refresh_interval"));
        }
        Ok(())
    }
}
