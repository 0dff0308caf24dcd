//! Ask (sell-side) order book
//!
//! Maintains sell orders sorted by price ascending (best ask first).

use std::collections::BTreeMap;
use types::errors::OrderError;
use types::ids::OrderId;
use types::numeric::{Price, Quantity};

use super::price_level::PriceLevel;
use super::LevelView;

/// Ask (sell) side order book
///
/// Orders are sorted by price ascending, so the lowest ask is first.
#[derive(Debug, Clone, Default)]
pub struct AskBook {
    levels: BTreeMap<Price, PriceLevel>,
}

impl AskBook {
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

    /// Remove an order from the ask book
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

    /// Get the best ask (lowest price)
    pub fn best_ask(&self) -> Option<(Price, Quantity)> {
        self.levels
            .iter()
            .next()
            .map(|(price, level)| (*price, level.total_quantity()))
    }

    pub fn best_ask_price(&self) -> Option<Price> {
        self.levels.keys().next().copied()
    }

    /// Oldest order at the best ask
    pub fn best_order_id(&self) -> Option<OrderId> {
        self.levels.values().next().and_then(PriceLevel::peek_front)
    }

    /// Get depth snapshot (top N price levels)
    pub fn depth_snapshot(&self, depth: usize) -> Vec<LevelView> {
        self.levels
            .iter()
            .take(depth)
            .map(|(price, level)| LevelView::new(*price, level))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn level_count(&self) -> usize {
        self.levels.len()
    }
}
