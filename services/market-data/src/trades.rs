//! Public trade tape
//!
//! Strips user identities from executed trades before they go on the
//! instrument's trade channel.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::ids::{Symbol, TradeId};
use types::numeric::{Price, Quantity};
use types::order::Side;
use types::trade::Trade;

/// A trade as seen by every subscriber of `trades@SYMBOL`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicTrade {
    pub trade_id: TradeId,
    /// Per-instrument trade sequence
    pub sequence: u64,
    pub symbol: Symbol,
    pub price: Price,
    pub quantity: Quantity,
    /// price × quantity
    pub value: Decimal,
    /// Side of the incoming order
    pub taker_side: Side,
    pub executed_at: i64,
}

impl From<&Trade> for PublicTrade {
    fn from(trade: &Trade) -> Self {
        Self {
            trade_id: trade.trade_id,
            sequence: trade.sequence,
            symbol: trade.symbol.clone(),
            price: trade.price,
            quantity: trade.quantity,
            value: trade.trade_value(),
            taker_side: trade.aggressor_side,
            executed_at: trade.executed_at,
        }
    }
}
