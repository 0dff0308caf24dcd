//! Order lifecycle types
//!
//! Status transitions are monotone:
//!
//! ```text
//! OPEN ──▶ PARTIALLY_FILLED ──▶ FILLED
//!   │              │
//!   └──────────────┴──────────▶ CANCELLED | REJECTED
//! ```
//!
//! Terminal orders (FILLED, CANCELLED, REJECTED) never change again.

use crate::errors::OrderError;
use crate::ids::{OrderId, Symbol, UserId};
use crate::numeric::{Price, Quantity, MAX_PRICE, MAX_QUANTITY};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order side (buyer or seller)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy order (bid)
    BUY,
    /// Sell order (ask)
    SELL,
}

impl Side {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::BUY => Side::SELL,
            Side::SELL => Side::BUY,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::BUY => write!(f, "BUY"),
            Side::SELL => write!(f, "SELL"),
        }
    }
}

/// Order kind
///
/// Market orders carry no price, never rest, and reject any unmatched remainder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderKind {
    Limit,
    Market,
}

/// Order status
///
/// Externally tagged so the journal's binary encoding round-trips it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Accepted, nothing executed yet
    #[serde(rename = "OPEN")]
    Open,

    /// Some quantity executed, remainder still live
    #[serde(rename = "PARTIALLY_FILLED")]
    PartiallyFilled,

    /// Completely executed (terminal)
    #[serde(rename = "FILLED")]
    Filled,

    /// Removed before completion (terminal)
    #[serde(rename = "CANCELLED")]
    Cancelled(CancelReason),

    /// Refused by validation or liquidity (terminal)
    #[serde(rename = "REJECTED")]
    Rejected(RejectReason),
}

impl OrderStatus {
    /// Check if status is terminal (no further transitions possible)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled(_) | OrderStatus::Rejected(_)
        )
    }

    /// Position in the lifecycle; transitions never decrease it
    fn rank(&self) -> u8 {
        match self {
            OrderStatus::Open => 0,
            OrderStatus::PartiallyFilled => 1,
            OrderStatus::Filled | OrderStatus::Cancelled(_) | OrderStatus::Rejected(_) => 2,
        }
    }

    /// Whether moving from `self` to `next` respects the lifecycle
    pub fn can_transition_to(&self, next: &OrderStatus) -> bool {
        !self.is_terminal() && next.rank() >= self.rank()
    }

    /// Wire label of the state
    pub fn label(&self) -> &'static str {
        match self {
            OrderStatus::Open => "OPEN",
            OrderStatus::PartiallyFilled => "PARTIALLY_FILLED",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Cancelled(_) => "CANCELLED",
            OrderStatus::Rejected(_) => "REJECTED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CancelReason {
    UserRequested,
    SelfTradePrevention,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectReason {
    InvalidPrice,
    InvalidQuantity,
    InvalidSymbol,
    DuplicateOrder,
    InsufficientLiquidity,
}

/// Complete order record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub symbol: Symbol,
    pub side: Side,
    pub kind: OrderKind,
    /// Absent for market orders
    pub price: Option<Price>,
    pub quantity: Quantity,
    pub remaining_quantity: Quantity,
    pub status: OrderStatus,
    pub created_at: i64, // Unix nanos
    pub updated_at: i64, // Unix nanos
}

impl Order {
    /// Create a new open limit order
    pub fn limit(
        user_id: UserId,
        symbol: Symbol,
        side: Side,
        price: Price,
        quantity: Quantity,
        timestamp: i64,
    ) -> Self {
        Self::build(user_id, symbol, side, OrderKind::Limit, Some(price), quantity, timestamp)
    }

    /// Create a new open market order
    pub fn market(
        user_id: UserId,
        symbol: Symbol,
        side: Side,
        quantity: Quantity,
        timestamp: i64,
    ) -> Self {
        Self::build(user_id, symbol, side, OrderKind::Market, None, quantity, timestamp)
    }

    fn build(
        user_id: UserId,
        symbol: Symbol,
        side: Side,
        kind: OrderKind,
        price: Option<Price>,
        quantity: Quantity,
        timestamp: i64,
    ) -> Self {
        Self {
            order_id: OrderId::new(),
            user_id,
            symbol,
            side,
            kind,
            price,
            quantity,
            remaining_quantity: quantity,
            status: OrderStatus::Open,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// Check quantity invariant: 0 <= remaining <= requested
    pub fn check_invariant(&self) -> bool {
        !self.remaining_quantity.as_decimal().is_sign_negative()
            && self.remaining_quantity <= self.quantity
    }

    /// Quantity executed so far (requested - remaining)
    pub fn filled_quantity(&self) -> Quantity {
        self.quantity
            .checked_sub(self.remaining_quantity)
            .unwrap_or_else(Quantity::zero)
    }

    /// Check if order is completely filled
    pub fn is_filled(&self) -> bool {
        self.remaining_quantity.is_zero() && matches!(self.status, OrderStatus::Filled)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn has_fills(&self) -> bool {
        self.remaining_quantity < self.quantity
    }

    /// Validate an incoming order before it may touch a book
    pub fn validate(&self) -> Result<(), OrderError> {
        if !self.symbol.is_valid() {
            return Err(OrderError::InvalidSymbol(self.symbol.to_string()));
        }
        if !self.quantity.is_positive() {
            return Err(OrderError::InvalidQuantity(format!(
                "quantity must be positive, got {}",
                self.quantity
            )));
        }
        if self.quantity.exceeds_max() {
            return Err(OrderError::InvalidQuantity(format!(
                "quantity {} above maximum {}",
                self.quantity, MAX_QUANTITY
            )));
        }
        if !self.check_invariant() {
            return Err(OrderError::InvalidQuantity(format!(
                "remaining {} outside [0, {}]",
                self.remaining_quantity, self.quantity
            )));
        }
        match (self.kind, self.price) {
            (OrderKind::Limit, None) => Err(OrderError::InvalidPrice(
                "limit order requires a price".to_string(),
            )),
            (OrderKind::Limit, Some(price)) if !price.is_valid() => Err(OrderError::InvalidPrice(
                format!("price must be positive, got {}", price),
            )),
            (OrderKind::Limit, Some(price)) if price.exceeds_max() => Err(OrderError::InvalidPrice(
                format!("price {} above maximum {}", price, MAX_PRICE),
            )),
            (OrderKind::Market, Some(_)) => Err(OrderError::InvalidPrice(
                "market order must not carry a price".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Move to `next`, enforcing the monotone lifecycle
    fn transition(&mut self, next: OrderStatus, timestamp: i64) -> Result<(), OrderError> {
        if !self.status.can_transition_to(&next) {
            return Err(if self.status.is_terminal() {
                OrderError::AlreadyTerminal {
                    status: self.status.to_string(),
                }
            } else {
                OrderError::InvalidStateTransition {
                    from: self.status.to_string(),
                    to: next.to_string(),
                }
            });
        }
        self.status = next;
        self.updated_at = timestamp;
        Ok(())
    }

    /// Record an execution of `fill_quantity` and adjust status
    pub fn fill(&mut self, fill_quantity: Quantity, timestamp: i64) -> Result<(), OrderError> {
        if !fill_quantity.is_positive() {
            return Err(OrderError::InvalidQuantity(format!(
                "fill must be positive, got {}",
                fill_quantity
            )));
        }
        let remaining = self
            .remaining_quantity
            .checked_sub(fill_quantity)
            .ok_or_else(|| OrderError::Overfill {
                fill: fill_quantity.to_string(),
                remaining: self.remaining_quantity.to_string(),
            })?;

        let next = if remaining.is_zero() {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        self.transition(next, timestamp)?;
        self.remaining_quantity = remaining;
        Ok(())
    }

    /// Cancel the order; the remaining quantity is left as it was
    pub fn cancel(&mut self, reason: CancelReason, timestamp: i64) -> Result<(), OrderError> {
        self.transition(OrderStatus::Cancelled(reason), timestamp)
    }

    /// Reject the order; executions already made stay recorded
    pub fn reject(&mut self, reason: RejectReason, timestamp: i64) -> Result<(), OrderError> {
        self.transition(OrderStatus::Rejected(reason), timestamp)
    }
}
