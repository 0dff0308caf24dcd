//! Private order events produced by matching
//!
//! Each event is addressed to the owner of the order it describes.

use serde::{Deserialize, Serialize};
use types::ids::{OrderId, Symbol, UserId};
use types::order::Order;
use types::trade::Trade;

/// Order lifecycle event for one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderEvent {
    /// Order entered the book or the matching step
    Accepted { order: Order },

    /// A trade executed; order still has remaining quantity
    PartiallyFilled { order: Order, trade: Trade },

    /// A trade executed and completed the order
    Filled { order: Order, trade: Trade },

    Cancelled { order: Order },

    /// Validation failure or unmatched market remainder
    Rejected { order: Order },

    /// Cancel request that could not be honoured
    CancelRejected {
        order_id: OrderId,
        symbol: Symbol,
        user_id: UserId,
        reason: String,
    },
}

impl OrderEvent {
    /// Fill event for `order` after `trade`
    pub fn fill(order: Order, trade: Trade) -> Self {
        if order.remaining_quantity.is_zero() {
            OrderEvent::Filled { order, trade }
        } else {
            OrderEvent::PartiallyFilled { order, trade }
        }
    }

    /// User the event is addressed to
    pub fn user_id(&self) -> UserId {
        match self {
            OrderEvent::Accepted { order }
            | OrderEvent::PartiallyFilled { order, .. }
            | OrderEvent::Filled { order, .. }
            | OrderEvent::Cancelled { order }
            | OrderEvent::Rejected { order } => order.user_id,
            OrderEvent::CancelRejected { user_id, .. } => *user_id,
        }
    }

    pub fn order_id(&self) -> OrderId {
        match self {
            OrderEvent::Accepted { order }
            | OrderEvent::PartiallyFilled { order, .. }
            | OrderEvent::Filled { order, .. }
            | OrderEvent::Cancelled { order }
            | OrderEvent::Rejected { order } => order.order_id,
            OrderEvent::CancelRejected { order_id, .. } => *order_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            OrderEvent::Accepted { .. } => "ACCEPTED",
            OrderEvent::PartiallyFilled { .. } => "PARTIALLY_FILLED",
            OrderEvent::Filled { .. } => "FILLED",
            OrderEvent::Cancelled { .. } => "CANCELLED",
            OrderEvent::Rejected { .. } => "REJECTED",
            OrderEvent::CancelRejected { .. } => "CANCEL_REJECTED",
        }
    }
}
