//! Matching logic module
//!
//! Implements price-time priority matching

pub mod crossing;
pub mod executor;
pub mod policy;

pub use crossing::can_match;
pub use executor::MatchExecutor;
pub use policy::SelfTradePolicy;
