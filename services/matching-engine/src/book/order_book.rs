//! Per-instrument order book
//!
//! Owns the resting order records and both book sides. The book is a
//! single-writer value: only the instrument's worker mutates it.

use std::collections::HashMap;
use types::errors::OrderError;
use types::ids::{OrderId, Symbol};
use types::numeric::{Price, Quantity};
use types::order::{Order, OrderKind, Side};

use super::{AskBook, BidBook, Depth, LevelView, TopOfBook};
use crate::error::EngineError;

#[derive(Debug, Clone)]
struct Resting {
    order: Order,
    /// Insertion counter, used to list open orders in arrival order
    arrival: u64,
}

/// Order book for a single instrument
#[derive(Debug, Clone)]
pub struct OrderBook {
    symbol: Symbol,
    bids: BidBook,
    asks: AskBook,
    orders: HashMap<OrderId, Resting>,
    next_arrival: u64,
}

impl OrderBook {
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            bids: BidBook::new(),
            asks: AskBook::new(),
            orders: HashMap::new(),
            next_arrival: 0,
        }
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Add a resting limit order behind all orders at its price
    pub fn insert(&mut self, order: Order) -> Result<(), EngineError> {
        let price = self.check_restable(&order)?;
        if self.orders.contains_key(&order.order_id) {
            return Err(EngineError::DuplicateOrder {
                order_id: order.order_id,
            });
        }

        match order.side {
            Side::BUY => self.bids.insert(order.order_id, price, order.remaining_quantity),
            Side::SELL => self.asks.insert(order.order_id, price, order.remaining_quantity),
        }?;
        let arrival = self.next_arrival;
        self.next_arrival += 1;
        self.orders.insert(order.order_id, Resting { order, arrival });
        Ok(())
    }

    fn check_restable(&self, order: &Order) -> Result<Price, OrderError> {
        if order.kind != OrderKind::Limit {
            return Err(OrderError::NotRestable);
        }
        if order.symbol != self.symbol {
            return Err(OrderError::SymbolMismatch {
                expected: self.symbol.to_string(),
                actual: order.symbol.to_string(),
            });
        }
        if order.is_terminal() {
            return Err(OrderError::AlreadyTerminal {
                status: order.status.to_string(),
            });
        }
        let price = order
            .price
            .filter(Price::is_valid)
            .ok_or_else(|| OrderError::InvalidPrice(format!("{:?}", order.price)))?;
        if !order.remaining_quantity.is_positive() || !order.check_invariant() {
            return Err(OrderError::InvalidQuantity(format!(
                "remaining {} of {}",
                order.remaining_quantity, order.quantity
            )));
        }
        Ok(price)
    }

    /// Best resting order on a side (oldest order at the best price)
    pub fn best(&self, side: Side) -> Option<&Order> {
        let order_id = match side {
            Side::BUY => self.bids.best_order_id(),
            Side::SELL => self.asks.best_order_id(),
        }?;
        self.get(&order_id)
    }

    pub fn best_price(&self, side: Side) -> Option<Price> {
        match side {
            Side::BUY => self.bids.best_bid_price(),
            Side::SELL => self.asks.best_ask_price(),
        }
    }

    /// Remove a resting order, returning its record unchanged
    pub fn remove(&mut self, order_id: &OrderId) -> Result<Order, EngineError> {
        let resting = self
            .orders
            .remove(order_id)
            .ok_or(EngineError::OrderNotFound { order_id: *order_id })?;
        let order = resting.order;
        if let Some(price) = order.price {
            match order.side {
                Side::BUY => self.bids.remove(order_id, price),
                Side::SELL => self.asks.remove(order_id, price),
            };
        }
        Ok(order)
    }

    /// Record a fill against a resting order
    ///
    /// The order leaves the book when its remaining quantity reaches zero.
    /// Returns the updated order record.
    pub fn reduce(
        &mut self,
        order_id: &OrderId,
        filled: Quantity,
        timestamp: i64,
    ) -> Result<Order, EngineError> {
        let resting = self
            .orders
            .get_mut(order_id)
            .ok_or(EngineError::OrderNotFound { order_id: *order_id })?;
        let price = resting
            .order
            .price
            .ok_or(OrderError::NotRestable)?;

        resting.order.fill(filled, timestamp)?;
        let updated = resting.order.clone();

        match updated.side {
            Side::BUY => self.bids.reduce(order_id, price, filled),
            Side::SELL => self.asks.reduce(order_id, price, filled),
        };
        if updated.remaining_quantity.is_zero() {
            self.orders.remove(order_id);
        }
        Ok(updated)
    }

    pub fn get(&self, order_id: &OrderId) -> Option<&Order> {
        self.orders.get(order_id).map(|resting| &resting.order)
    }

    pub fn contains(&self, order_id: &OrderId) -> bool {
        self.orders.contains_key(order_id)
    }

    /// Number of resting orders
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn top_of_book(&self) -> TopOfBook {
        TopOfBook {
            best_bid: self.bids.depth_snapshot(1).into_iter().next(),
            best_ask: self.asks.depth_snapshot(1).into_iter().next(),
        }
    }

    /// Top `levels` aggregated price levels per side
    pub fn depth(&self, levels: usize) -> Depth {
        Depth {
            bids: self.bids.depth_snapshot(levels),
            asks: self.asks.depth_snapshot(levels),
        }
    }

    /// Resting orders in arrival order
    pub fn open_orders(&self) -> Vec<Order> {
        let mut resting: Vec<&Resting> = self.orders.values().collect();
        resting.sort_by_key(|r| r.arrival);
        resting.into_iter().map(|r| r.order.clone()).collect()
    }

    pub fn is_crossed(&self) -> bool {
        matches!(
            (self.bids.best_bid_price(), self.asks.best_ask_price()),
            (Some(bid), Some(ask)) if bid >= ask
        )
    }

    /// Fails with `CrossedBook` when best bid >= best ask
    pub fn check_not_crossed(&self) -> Result<(), EngineError> {
        match (self.bids.best_bid_price(), self.asks.best_ask_price()) {
            (Some(best_bid), Some(best_ask)) if best_bid >= best_ask => {
                Err(EngineError::CrossedBook {
                    symbol: self.symbol.clone(),
                    best_bid,
                    best_ask,
                })
            }
            _ => Ok(()),
        }
    }

    /// Level views for one side, best first
    pub fn levels(&self, side: Side, levels: usize) -> Vec<LevelView> {
        match side {
            Side::BUY => self.bids.depth_snapshot(levels),
            Side::SELL => self.asks.depth_snapshot(levels),
        }
    }
}
