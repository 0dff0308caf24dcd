//! Persistence adapter contract
//!
//! The pipeline reaches durable storage only through [`PersistenceAdapter`].
//! A commit writes the touched orders, the produced trades and the command
//! id as one unit, so redelivery after a crash can be detected.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use types::ids::{CommandId, OrderId, Symbol};
use types::order::Order;
use types::trade::Trade;

use crate::journal::JournalError;
use crate::reader::ReaderError;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Journal error: {0}")]
    Journal(#[from] JournalError),

    #[error("Replay error: {0}")]
    Replay(#[from] ReaderError),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Trade sequence for {symbol} went backwards: last {last}, got {got}")]
    SequenceRegression { symbol: Symbol, last: u64, got: u64 },
}

impl From<std::io::Error> for PersistenceError {
    fn from(e: std::io::Error) -> Self {
        PersistenceError::Journal(e.into())
    }
}

impl From<bincode::Error> for PersistenceError {
    fn from(e: bincode::Error) -> Self {
        PersistenceError::Encoding(e.to_string())
    }
}

/// Everything one command changed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommitBatch {
    pub command_id: CommandId,
    pub symbol: Symbol,
    /// Final state of every order the command touched
    pub orders: Vec<Order>,
    /// Trades in sequence order
    pub trades: Vec<Trade>,
    pub committed_at: i64, // Unix nanos
}

impl CommitBatch {
    /// Batch that only records the command as processed
    pub fn empty(command_id: CommandId, symbol: Symbol, committed_at: i64) -> Self {
        Self {
            command_id,
            symbol,
            orders: Vec::new(),
            trades: Vec::new(),
            committed_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStatus {
    Applied,
    /// The command id was already committed; nothing was written
    AlreadyCommitted,
}

/// Durable store for orders, trades and processed command ids
///
/// Implementations must be safe to share across instrument workers.
#[async_trait]
pub trait PersistenceAdapter: Send + Sync + 'static {
    /// Upsert one order record
    async fn save_order(&self, order: &Order) -> Result<(), PersistenceError>;

    /// Append one trade record
    async fn save_trade(&self, trade: &Trade) -> Result<(), PersistenceError>;

    /// Non-terminal orders of an instrument in original arrival order
    async fn load_open_orders(&self, symbol: &Symbol) -> Result<Vec<Order>, PersistenceError>;

    /// Atomically record a batch, keyed by its command id
    async fn commit(&self, batch: &CommitBatch) -> Result<CommitStatus, PersistenceError>;

    async fn is_committed(&self, command_id: &CommandId) -> Result<bool, PersistenceError>;

    /// Highest trade sequence recorded for an instrument (0 if none)
    async fn last_trade_sequence(&self, symbol: &Symbol) -> Result<u64, PersistenceError>;

    async fn load_order(&self, order_id: &OrderId) -> Result<Option<Order>, PersistenceError>;
}
