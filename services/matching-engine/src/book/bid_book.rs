//! Bid (buy-side) order book
//!
//! Maintains buy orders sorted by price descending (best bid first).
//! BTreeMap keeps iteration deterministic.

use std::collections::BTreeMap;
use types::errors::OrderError;
use types::ids::OrderId;
use types::numeric::{Price, Quantity};

use super::price_level::PriceLevel;
use super::LevelView;

/// Bid (buy) side order book
///
/// Orders are sorted by price descending, so the highest bid is first.
/// At each price level, orders are maintained in FIFO order.
#[derive(Debug, Clone, Default)]
pub struct BidBook {
    levels: BTreeMap<Price, PriceLevel>,
}

impl BidBook {
    /// Create a new empty bid book
    pub fn new() -> Self {
        Self {
            levels: BTreeMap::new(),
        }
    }

    /// Append an order to its price level
    pub fn insert(
        &mut self,
        order_id: OrderId,
        price: Price,
        quantity: Quantity,
    ) -> Result<(), OrderError> {
        self.levels
            .entry(price)
            .or_insert_with(PriceLevel::new)
            .insert(order_id, quantity)
    }

    /// Remove an order from the bid book
    ///
    /// Returns true if the order was found and removed
    pub fn remove(&mut self, order_id: &OrderId, price: Price) -> bool {
        let Some(level) = self.levels.get_mut(&price) else {
            return false;
        };
        let removed = level.remove(order_id).is_some();
        if level.is_empty() {
            self.levels.remove(&price);
        }
        removed
    }

    /// Reduce a resting order; returns its new remaining quantity
    pub fn reduce(&mut self, order_id: &OrderId, price: Price, filled: Quantity) -> Option<Quantity> {
        let level = self.levels.get_mut(&price)?;
        let remaining = level.reduce(order_id, filled);
        if level.is_empty() {
            self.levels.remove(&price);
        }
        remaining
    }

    /// Get the best bid (highest price)
    pub fn best_bid(&self) -> Option<(Price, Quantity)> {
        // BTreeMap iter is ascending, so we need last()
        self.levels
            .iter()
            .next_back()
            .map(|(price, level)| (*price, level.total_quantity()))
    }

    /// Get the best bid price
    pub fn best_bid_price(&self) -> Option<Price> {
        self.levels.keys().next_back().copied()
    }

    /// Oldest order at the best bid
    pub fn best_order_id(&self) -> Option<OrderId> {
        self.levels.values().next_back().and_then(PriceLevel::peek_front)
    }

    /// Get depth snapshot (top N price levels)
    pub fn depth_snapshot(&self, depth: usize) -> Vec<LevelView> {
        self.levels
            .iter()
            .rev() // Highest prices first
            .take(depth)
            .map(|(price, level)| LevelView::new(*price, level))
            .collect()
    }

    /// Check if the bid book is empty
    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Get the total number of price levels
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }
}
