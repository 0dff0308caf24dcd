//! Exchange configuration
//!
//! Loaded from an optional TOML file named by `EXCHANGE_CONFIG`, then
//! overridden by environment variables:
//! - `EXCHANGE_INSTRUMENTS`: comma separated symbols
//! - `SERVER_ADDR`: listen address
//! - `JOURNAL_DIR`: enables the journal-backed store

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use market_data::SessionConfig;
use matching_engine::SelfTradePolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use types::ids::Symbol;

pub const ENV_CONFIG_PATH: &str = "EXCHANGE_CONFIG";
pub const ENV_INSTRUMENTS: &str = "EXCHANGE_INSTRUMENTS";
pub const ENV_SERVER_ADDR: &str = "SERVER_ADDR";
pub const ENV_JOURNAL_DIR: &str = "JOURNAL_DIR";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid instrument symbol: {0:?}")]
    InvalidSymbol(String),

    #[error("Invalid server address: {0:?}")]
    InvalidAddr(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Backoff for persistence retries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Failed attempts still allowed once shutdown has been requested
    pub shutdown_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 10,
            max_backoff_ms: 5_000,
            shutdown_attempts: 3,
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `attempt` (0-based), doubling up to the max
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.min(32)).unwrap_or(u64::MAX);
        let millis = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(millis)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    /// Per-topic buffer; lagging subscribers lose the oldest messages
    pub channel_capacity: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            channel_capacity: market_data::hub::DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    pub instruments: Vec<String>,
    pub server_addr: String,
    /// Levels per side in published depth snapshots
    pub book_depth: usize,
    pub self_trade_policy: SelfTradePolicy,
    pub retry: RetryConfig,
    pub broadcast: BroadcastConfig,
    pub session: SessionConfig,
    /// In-memory store when absent
    pub journal_dir: Option<PathBuf>,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            instruments: Vec::new(),
            server_addr: "0.0.0.0:8080".to_string(),
            book_depth: 20,
            self_trade_policy: SelfTradePolicy::default(),
            retry: RetryConfig::default(),
            broadcast: BroadcastConfig::default(),
            session: SessionConfig::default(),
            journal_dir: None,
        }
    }
}

impl ExchangeConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// File named by `EXCHANGE_CONFIG` (or defaults) plus environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// [`ExchangeConfig::load`] with an explicit variable lookup
    pub fn load_with(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = match lookup(ENV_CONFIG_PATH) {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(lookup);
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(list) = lookup(ENV_INSTRUMENTS) {
            self.instruments = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(addr) = lookup(ENV_SERVER_ADDR) {
            self.server_addr = addr;
        }
        if let Some(dir) = lookup(ENV_JOURNAL_DIR) {
            self.journal_dir = Some(PathBuf::from(dir));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.symbols()?;
        self.socket_addr()?;
        if self.book_depth == 0 {
            return Err(ConfigError::InvalidValue {
                field: "book_depth",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(ConfigError::InvalidValue {
                field: "retry.initial_backoff_ms",
                reason: "exceeds retry.max_backoff_ms".to_string(),
            });
        }
        Ok(())
    }

    pub fn symbols(&self) -> Result<Vec<Symbol>, ConfigError> {
        self.instruments
            .iter()
            .map(|s| Symbol::try_new(s.as_str()).ok_or_else(|| ConfigError::InvalidSymbol(s.clone())))
            .collect()
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server_addr
            .parse()
            .map_err(|_| ConfigError::InvalidAddr(self.server_addr.clone()))
    }
}
