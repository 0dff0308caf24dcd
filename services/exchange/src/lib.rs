//! Exchange Service
//!
//! Wires the matching engine, persistence and market data crates into the
//! event ingestion pipeline: one sequential worker per instrument fed by a
//! durable ordered command stream.

pub mod config;
pub mod pipeline;
pub mod service;

pub use config::{ConfigError, ExchangeConfig, RetryConfig};
pub use pipeline::{InstrumentWorker, PipelineError, WorkerReport, WorkerSettings, WorkerStats};
pub use service::{ExchangeService, ServiceError};

impl From<&ExchangeConfig> for WorkerSettings {
    fn from(config: &ExchangeConfig) -> Self {
        Self {
            retry: config.retry,
            book_depth: config.book_depth,
            self_trade_policy: config.self_trade_policy,
        }
    }
}
