//! Trade execution types
//!
//! A trade is created once by the matching engine and never mutated.
//! The execution price is always the resting order's price.

use crate::ids::{OrderId, Symbol, TradeId, UserId};
use crate::numeric::{Price, Quantity};
use crate::order::Side;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Immutable execution record between an aggressor and a resting order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub trade_id: TradeId,
    pub sequence: u64, // Per-instrument, strictly increasing
    pub symbol: Symbol,

    // Order references
    pub aggressor_order_id: OrderId,
    pub resting_order_id: OrderId,

    // User references
    pub aggressor_user_id: UserId,
    pub resting_user_id: UserId,

    pub aggressor_side: Side,
    pub price: Price,
    pub quantity: Quantity,

    pub executed_at: i64, // Unix nanos
}

impl Trade {
    /// Create a new trade
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sequence: u64,
        symbol: Symbol,
        aggressor_order_id: OrderId,
        resting_order_id: OrderId,
        aggressor_user_id: UserId,
        resting_user_id: UserId,
        aggressor_side: Side,
        price: Price,
        quantity: Quantity,
        executed_at: i64,
    ) -> Self {
        Self {
            trade_id: TradeId::new(),
            sequence,
            symbol,
            aggressor_order_id,
            resting_order_id,
            aggressor_user_id,
            resting_user_id,
            aggressor_side,
            price,
            quantity,
            executed_at,
        }
    }

    /// Calculate trade value (price × quantity)
    pub fn trade_value(&self) -> Decimal {
        self.quantity.as_decimal() * self.price.as_decimal()
    }

    /// Same user on both sides
    pub fn is_self_trade(&self) -> bool {
        self.aggressor_user_id == self.resting_user_id
    }

    /// Users whose orders took part in the trade
    pub fn participants(&self) -> [UserId; 2] {
        [self.aggressor_user_id, self.resting_user_id]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_trade(aggressor: UserId, resting: UserId) -> Trade {
        Trade::new(
            1,
            Symbol::new("AAPL"),
            OrderId::new(),
            OrderId::new(),
            aggressor,
            resting,
            Side::BUY,
            Price::from_u64(100),
            Quantity::from_str("2.5").unwrap(),
            1708123456789000000,
        )
    }

    #[test]
    fn test_trade_value() {
        let trade = create_test_trade(UserId::new(), UserId::new());
        assert_eq!(trade.trade_value(), Decimal::from(250));
    }

    #[test]
    fn test_self_trade_detection() {
        let user = UserId::new();
        assert!(create_test_trade(user, user).is_self_trade());
        assert!(!create_test_trade(user, UserId::new()).is_self_trade());
    }

    #[test]
    fn test_trade_serialization() {
        let trade = create_test_trade(UserId::new(), UserId::new());
        let json = serde_json::to_value(&trade).unwrap();
        assert_eq!(json["price"], "100");
        assert_eq!(json["aggressor_side"], "BUY");
        assert_eq!(json["sequence"], 1);
    }
}
