//! Self-trade handling

use serde::{Deserialize, Serialize};

/// What to do when an aggressor would trade with its own user's resting order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SelfTradePolicy {
    /// Trade normally
    #[default]
    Allow,
    /// Cancel the resting order and keep matching
    CancelResting,
    /// Cancel the aggressor's remainder and stop matching
    CancelAggressor,
}
