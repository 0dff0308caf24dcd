//! Matching Engine Service
//!
//! Per-instrument order book and price-time priority matching.
//!
//! **Key Invariants:**
//! - Price-time priority strictly enforced
//! - Execution at the resting order's price
//! - Deterministic matching (same inputs, same outputs)
//! - Conservation of quantity
//! - Best bid < best ask after every submission

pub mod book;
pub mod engine;
pub mod error;
pub mod events;
pub mod matching;

pub use book::OrderBook;
pub use engine::{MatchOutcome, MatchingEngine};
pub use error::EngineError;
pub use events::OrderEvent;
pub use matching::SelfTradePolicy;
