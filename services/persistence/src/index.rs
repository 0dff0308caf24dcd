//! In-memory index shared by the store implementations
//!
//! Holds the latest record of every order, all trades, committed command
//! ids and the last trade sequence per instrument. Applying the same batch
//! twice is a no-op.

use std::collections::{BTreeMap, HashMap, HashSet};
use types::ids::{CommandId, OrderId, Symbol};
use types::order::Order;
use types::trade::Trade;

use crate::adapter::{CommitBatch, CommitStatus, PersistenceError};

#[derive(Debug, Clone)]
struct StoredOrder {
    order: Order,
    /// Position of the first write, preserves arrival order
    first_seen: u64,
}

#[derive(Debug, Default)]
pub struct StoreIndex {
    orders: HashMap<OrderId, StoredOrder>,
    trades: HashMap<Symbol, BTreeMap<u64, Trade>>,
    committed: HashSet<CommandId>,
    next_position: u64,
}

impl StoreIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_order(&mut self, order: &Order) {
        match self.orders.get_mut(&order.order_id) {
            Some(stored) => stored.order = order.clone(),
            None => {
                let first_seen = self.next_position;
                self.next_position += 1;
                self.orders.insert(
                    order.order_id,
                    StoredOrder {
                        order: order.clone(),
                        first_seen,
                    },
                );
            }
        }
    }

    /// Record a trade; its sequence must exceed the instrument's last one
    pub fn insert_trade(&mut self, trade: &Trade) -> Result<(), PersistenceError> {
        let last = self.last_trade_sequence(&trade.symbol);
        if trade.sequence <= last {
            return Err(PersistenceError::SequenceRegression {
                symbol: trade.symbol.clone(),
                last,
                got: trade.sequence,
            });
        }
        self.trades
            .entry(trade.symbol.clone())
            .or_default()
            .insert(trade.sequence, trade.clone());
        Ok(())
    }

    /// Check a batch can be applied without partial effects
    pub fn check(&self, batch: &CommitBatch) -> Result<CommitStatus, PersistenceError> {
        if self.committed.contains(&batch.command_id) {
            return Ok(CommitStatus::AlreadyCommitted);
        }
        let mut last = self.last_trade_sequence(&batch.symbol);
        for trade in &batch.trades {
            if trade.sequence <= last {
                return Err(PersistenceError::SequenceRegression {
                    symbol: trade.symbol.clone(),
                    last,
                    got: trade.sequence,
                });
            }
            last = trade.sequence;
        }
        Ok(CommitStatus::Applied)
    }

    /// Apply a batch previously accepted by [`StoreIndex::check`]
    pub fn apply(&mut self, batch: &CommitBatch) -> Result<CommitStatus, PersistenceError> {
        let status = self.check(batch)?;
        if status == CommitStatus::AlreadyCommitted {
            return Ok(status);
        }
        for order in &batch.orders {
            self.upsert_order(order);
        }
        for trade in &batch.trades {
            self.insert_trade(trade)?;
        }
        self.committed.insert(batch.command_id);
        Ok(CommitStatus::Applied)
    }

    pub fn open_orders(&self, symbol: &Symbol) -> Vec<Order> {
        let mut open: Vec<&StoredOrder> = self
            .orders
            .values()
            .filter(|stored| &stored.order.symbol == symbol && !stored.order.is_terminal())
            .collect();
        open.sort_by_key(|stored| stored.first_seen);
        open.into_iter().map(|stored| stored.order.clone()).collect()
    }

    pub fn is_committed(&self, command_id: &CommandId) -> bool {
        self.committed.contains(command_id)
    }

    pub fn last_trade_sequence(&self, symbol: &Symbol) -> u64 {
        self.trades
            .get(symbol)
            .and_then(|trades| trades.keys().next_back().copied())
            .unwrap_or(0)
    }

    pub fn order(&self, order_id: &OrderId) -> Option<Order> {
        self.orders.get(order_id).map(|stored| stored.order.clone())
    }

    pub fn trades(&self, symbol: &Symbol) -> Vec<Trade> {
        self.trades
            .get(symbol)
            .map(|trades| trades.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn committed_count(&self) -> usize {
        self.committed.len()
    }
}
