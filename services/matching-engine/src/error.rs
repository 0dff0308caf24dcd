//! Matching engine error taxonomy

use thiserror::Error;
use types::errors::OrderError;
use types::ids::{OrderId, Symbol};
use types::numeric::Price;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Invalid order: {0}")]
    InvalidOrder(#[from] OrderError),

    #[error("Order already resting: {order_id}")]
    DuplicateOrder { order_id: OrderId },

    #[error("Order not found: {order_id}")]
    OrderNotFound { order_id: OrderId },

    #[error("Order {order_id} belongs to another user")]
    NotOwner { order_id: OrderId },

    #[error("Crossed book on {symbol}: best bid {best_bid} >= best ask {best_ask}")]
    CrossedBook {
        symbol: Symbol,
        best_bid: Price,
        best_ask: Price,
    },
}

impl EngineError {
    /// Whether the instrument's worker must stop
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::CrossedBook { .. })
    }
}
