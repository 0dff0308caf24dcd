//! Matching engine core
//!
//! One engine per instrument. It owns that instrument's book and trade
//! sequence, and applies orders strictly one at a time.

use tracing::{debug, warn};
use types::ids::{OrderId, Symbol, UserId};
use types::order::{CancelReason, Order, OrderKind, OrderStatus, RejectReason};
use types::trade::Trade;

use crate::book::{Depth, OrderBook, TopOfBook};
use crate::error::EngineError;
use crate::events::OrderEvent;
use crate::matching::{crossing, MatchExecutor, SelfTradePolicy};

/// Result of submitting one order
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    /// Final state of the incoming order
    pub order: Order,
    /// Trades in execution order
    pub trades: Vec<Trade>,
    /// Resting orders changed by this submission, final state each
    pub resting_updates: Vec<Order>,
    /// Private events in emission order
    pub events: Vec<OrderEvent>,
}

impl MatchOutcome {
    /// Every order record that changed, resting orders first
    pub fn touched_orders(&self) -> Vec<Order> {
        let mut orders = self.resting_updates.clone();
        orders.push(self.order.clone());
        orders
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self.order.status, OrderStatus::Rejected(_))
    }
}

/// Price-time priority matching engine for a single instrument
#[derive(Debug, Clone)]
pub struct MatchingEngine {
    book: OrderBook,
    executor: MatchExecutor,
    policy: SelfTradePolicy,
}

impl MatchingEngine {
    /// Create an engine with an empty book
    pub fn new(symbol: Symbol, policy: SelfTradePolicy) -> Self {
        Self {
            book: OrderBook::new(symbol),
            executor: MatchExecutor::new(0),
            policy,
        }
    }

    /// Rebuild an engine from persisted open orders
    ///
    /// `open_orders` must be in original arrival order. Trade numbering
    /// resumes after `last_trade_sequence`.
    pub fn from_open_orders(
        symbol: Symbol,
        open_orders: Vec<Order>,
        last_trade_sequence: u64,
        policy: SelfTradePolicy,
    ) -> Result<Self, EngineError> {
        let mut book = OrderBook::new(symbol);
        for order in open_orders {
            book.insert(order)?;
        }
        book.check_not_crossed()?;

        Ok(Self {
            book,
            executor: MatchExecutor::new(last_trade_sequence),
            policy,
        })
    }

    pub fn symbol(&self) -> &Symbol {
        self.book.symbol()
    }

    /// Read-only access to the book
    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    pub fn last_trade_sequence(&self) -> u64 {
        self.executor.last_sequence()
    }

    pub fn top_of_book(&self) -> TopOfBook {
        self.book.top_of_book()
    }

    pub fn depth(&self, levels: usize) -> Depth {
        self.book.depth(levels)
    }

    /// Submit an order to the matching engine
    ///
    /// Invalid orders come back rejected inside the outcome rather than as
    /// an error, so the caller can record the rejection. Errors are
    /// `DuplicateOrder` (id already resting) and the fatal `CrossedBook`.
    pub fn submit(&mut self, mut order: Order, timestamp: i64) -> Result<MatchOutcome, EngineError> {
        if self.book.contains(&order.order_id) {
            return Err(EngineError::DuplicateOrder {
                order_id: order.order_id,
            });
        }

        if let Err(reason) = self.validate(&order) {
            debug!(order_id = %order.order_id, ?reason, "Order rejected by validation");
            // Incoming orders have no prior lifecycle; record the rejection directly
            order.status = OrderStatus::Rejected(reason);
            order.updated_at = timestamp;
            return Ok(MatchOutcome {
                events: vec![OrderEvent::Rejected { order: order.clone() }],
                order,
                trades: Vec::new(),
                resting_updates: Vec::new(),
            });
        }

        let mut events = vec![OrderEvent::Accepted { order: order.clone() }];
        let mut trades = Vec::new();
        let mut resting_updates = Vec::new();

        let opposite = order.side.opposite();
        while order.remaining_quantity.is_positive() {
            let Some(resting) = self.book.best(opposite) else {
                break;
            };
            let crosses = resting
                .price
                .is_some_and(|price| crossing::incoming_can_match(order.side, order.price, price));
            if !crosses {
                break;
            }

            if resting.user_id == order.user_id {
                match self.policy {
                    SelfTradePolicy::Allow => {}
                    SelfTradePolicy::CancelResting => {
                        let resting_id = resting.order_id;
                        let mut cancelled = self.book.remove(&resting_id)?;
                        cancelled.cancel(CancelReason::SelfTradePrevention, timestamp)?;
                        events.push(OrderEvent::Cancelled { order: cancelled.clone() });
                        resting_updates.push(cancelled);
                        continue;
                    }
                    SelfTradePolicy::CancelAggressor => {
                        order.cancel(CancelReason::SelfTradePrevention, timestamp)?;
                        break;
                    }
                }
            }

            let quantity = order.remaining_quantity.min(resting.remaining_quantity);
            let resting_id = resting.order_id;
            let Some(trade) =
                self.executor
                    .execute_trade(self.book.symbol(), &order, resting, quantity, timestamp)
            else {
                break;
            };

            order.fill(quantity, timestamp)?;
            let resting_after = self.book.reduce(&resting_id, quantity, timestamp)?;

            events.push(OrderEvent::fill(resting_after.clone(), trade.clone()));
            events.push(OrderEvent::fill(order.clone(), trade.clone()));
            resting_updates.push(resting_after);
            trades.push(trade);
        }

        if !order.is_terminal() && order.remaining_quantity.is_positive() {
            match order.kind {
                OrderKind::Limit => match self.book.insert(order.clone()) {
                    Ok(()) => {}
                    Err(EngineError::InvalidOrder(e)) => {
                        warn!(order_id = %order.order_id, error = %e, "Remainder cannot rest");
                        order.reject(e.reject_reason(), timestamp)?;
                    }
                    Err(e) => return Err(e),
                },
                OrderKind::Market => {
                    order.reject(RejectReason::InsufficientLiquidity, timestamp)?;
                }
            }
        }
        if order.is_terminal() && !order.is_filled() {
            events.push(match order.status {
                OrderStatus::Cancelled(_) => OrderEvent::Cancelled { order: order.clone() },
                _ => OrderEvent::Rejected { order: order.clone() },
            });
        }

        self.book.check_not_crossed()?;

        debug!(
            symbol = %self.book.symbol(),
            order_id = %order.order_id,
            trades = trades.len(),
            status = %order.status,
            "Order matched"
        );

        Ok(MatchOutcome {
            order,
            trades,
            resting_updates,
            events,
        })
    }

    /// Cancel a resting order on behalf of `user_id`
    ///
    /// Fails with `OrderNotFound` if the order is not resting (unknown or
    /// already closed) and `NotOwner` if it belongs to another user.
    pub fn cancel(
        &mut self,
        order_id: &OrderId,
        user_id: &UserId,
        timestamp: i64,
    ) -> Result<Order, EngineError> {
        let owner = self
            .book
            .get(order_id)
            .map(|order| order.user_id)
            .ok_or(EngineError::OrderNotFound { order_id: *order_id })?;
        if &owner != user_id {
            warn!(%order_id, %user_id, "Cancel attempted by non-owner");
            return Err(EngineError::NotOwner { order_id: *order_id });
        }

        let mut order = self.book.remove(order_id)?;
        order.cancel(CancelReason::UserRequested, timestamp)?;
        Ok(order)
    }

    fn validate(&self, order: &Order) -> Result<(), RejectReason> {
        if &order.symbol != self.book.symbol() {
            return Err(RejectReason::InvalidSymbol);
        }
        if order.status != OrderStatus::Open || order.has_fills() {
            return Err(RejectReason::InvalidQuantity);
        }
        order.validate().map_err(|e| e.reject_reason())
    }
}
