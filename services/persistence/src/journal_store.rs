//! Journal-backed persistence adapter
//!
//! Every write is appended to the journal before the in-memory index sees
//! it. Opening the store replays the journal to rebuild the index, cutting
//! off a torn tail left by a crash.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};
use types::ids::{CommandId, OrderId, Symbol};
use types::order::Order;
use types::trade::Trade;

use crate::adapter::{CommitBatch, CommitStatus, PersistenceAdapter, PersistenceError};
use crate::index::StoreIndex;
use crate::journal::{JournalConfig, JournalRecord, JournalWriter};
use crate::reader::JournalReader;

struct Inner {
    writer: JournalWriter,
    index: StoreIndex,
}

pub struct JournalStore {
    inner: Mutex<Inner>,
}

impl JournalStore {
    /// Replay the journal in `config.dir` and open it for appending
    pub fn open(config: JournalConfig) -> Result<Self, PersistenceError> {
        let replay = JournalReader::open(&config.dir)?.replay()?;

        if let Some(torn) = &replay.torn_tail {
            torn.truncate()?;
        }

        let mut index = StoreIndex::new();
        for entry in &replay.entries {
            match entry.record()? {
                JournalRecord::Commit(batch) => {
                    index.apply(&batch)?;
                }
                JournalRecord::Order(order) => index.upsert_order(&order),
                JournalRecord::Trade(trade) => index.insert_trade(&trade)?,
                JournalRecord::Enqueued(_) | JournalRecord::Acked(_) => {
                    warn!(sequence = entry.sequence, kind = %entry.kind, "Skipping stream record in store journal");
                }
            }
        }

        let mut writer = JournalWriter::open(config)?;
        writer.set_next_sequence(replay.last_sequence() + 1);

        info!(
            entries = replay.entries.len(),
            commands = index.committed_count(),
            "Journal store recovered"
        );

        Ok(Self {
            inner: Mutex::new(Inner { writer, index }),
        })
    }

    /// Flush and fsync the journal
    pub async fn sync(&self) -> Result<(), PersistenceError> {
        self.inner.lock().await.writer.sync()?;
        Ok(())
    }
}

#[async_trait]
impl PersistenceAdapter for JournalStore {
    async fn save_order(&self, order: &Order) -> Result<(), PersistenceError> {
        let mut inner = self.inner.lock().await;
        inner
            .writer
            .write_record(order.updated_at, &JournalRecord::Order(order.clone()))?;
        inner.index.upsert_order(order);
        Ok(())
    }

    async fn save_trade(&self, trade: &Trade) -> Result<(), PersistenceError> {
        let mut inner = self.inner.lock().await;
        let last = inner.index.last_trade_sequence(&trade.symbol);
        if trade.sequence <= last {
            return Err(PersistenceError::SequenceRegression {
                symbol: trade.symbol.clone(),
                last,
                got: trade.sequence,
            });
        }
        inner
            .writer
            .write_record(trade.executed_at, &JournalRecord::Trade(trade.clone()))?;
        inner.index.insert_trade(trade)
    }

    async fn load_open_orders(&self, symbol: &Symbol) -> Result<Vec<Order>, PersistenceError> {
        Ok(self.inner.lock().await.index.open_orders(symbol))
    }

    async fn commit(&self, batch: &CommitBatch) -> Result<CommitStatus, PersistenceError> {
        let mut inner = self.inner.lock().await;
        if inner.index.check(batch)? == CommitStatus::AlreadyCommitted {
            return Ok(CommitStatus::AlreadyCommitted);
        }
        inner
            .writer
            .write_record(batch.committed_at, &JournalRecord::Commit(batch.clone()))?;
        inner.index.apply(batch)
    }

    async fn is_committed(&self, command_id: &CommandId) -> Result<bool, PersistenceError> {
        Ok(self.inner.lock().await.index.is_committed(command_id))
    }

    async fn last_trade_sequence(&self, symbol: &Symbol) -> Result<u64, PersistenceError> {
        Ok(self.inner.lock().await.index.last_trade_sequence(symbol))
    }

    async fn load_order(&self, order_id: &OrderId) -> Result<Option<Order>, PersistenceError> {
        Ok(self.inner.lock().await.index.order(order_id))
    }
}
