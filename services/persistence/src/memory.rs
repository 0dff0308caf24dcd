//! In-memory persistence adapter
//!
//! Used by tests and by deployments that do not need durability. Commit
//! failures can be injected to exercise the pipeline's retry path.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;
use types::ids::{CommandId, OrderId, Symbol};
use types::order::Order;
use types::trade::Trade;

use crate::adapter::{CommitBatch, CommitStatus, PersistenceAdapter, PersistenceError};
use crate::index::StoreIndex;

#[derive(Debug, Default)]
pub struct MemoryStore {
    index: Mutex<StoreIndex>,
    failing_commits: AtomicUsize,
    commit_attempts: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` commits fail with `Unavailable`
    pub fn fail_next_commits(&self, count: usize) {
        self.failing_commits.store(count, Ordering::SeqCst);
    }

    /// Number of commit calls, failed ones included
    pub fn commit_attempts(&self) -> usize {
        self.commit_attempts.load(Ordering::SeqCst)
    }

    /// All trades of an instrument in sequence order
    pub async fn trades(&self, symbol: &Symbol) -> Vec<Trade> {
        self.index.lock().await.trades(symbol)
    }

    pub async fn committed_count(&self) -> usize {
        self.index.lock().await.committed_count()
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl PersistenceAdapter for MemoryStore {
    async fn save_order(&self, order: &Order) -> Result<(), PersistenceError> {
        self.index.lock().await.upsert_order(order);
        Ok(())
    }

    async fn save_trade(&self, trade: &Trade) -> Result<(), PersistenceError> {
        self.index.lock().await.insert_trade(trade)
    }

    async fn load_open_orders(&self, symbol: &Symbol) -> Result<Vec<Order>, PersistenceError> {
        Ok(self.index.lock().await.open_orders(symbol))
    }

    async fn commit(&self, batch: &CommitBatch) -> Result<CommitStatus, PersistenceError> {
        self.commit_attempts.fetch_add(1, Ordering::SeqCst);
        if self.take_injected_failure() {
            return Err(PersistenceError::Unavailable(
                "injected commit failure".to_string(),
            ));
        }
        self.index.lock().await.apply(batch)
    }

    async fn is_committed(&self, command_id: &CommandId) -> Result<bool, PersistenceError> {
        Ok(self.index.lock().await.is_committed(command_id))
    }

    async fn last_trade_sequence(&self, symbol: &Symbol) -> Result<u64, PersistenceError> {
        Ok(self.index.lock().await.last_trade_sequence(symbol))
    }

    async fn load_order(&self, order_id: &OrderId) -> Result<Option<Order>, PersistenceError> {
        Ok(self.index.lock().await.order(order_id))
    }
}
