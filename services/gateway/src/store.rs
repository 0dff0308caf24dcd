use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use persistence::{
    AckHandle, CommandStream, CommitBatch, CommitStatus, JournalConfig, JournalStore,
    JournalStream, MemoryStore, MemoryStream, PersistenceAdapter, PersistenceError, StreamError,
};
use types::command::{Command, CommandEnvelope};
use types::ids::{CommandId, OrderId, Symbol};
use types::order::Order;
use types::trade::Trade;

/// Store selected at startup: journal when a directory is configured
pub enum Store {
    Memory(MemoryStore),
    Journal(JournalStore),
}

/// Command stream selected at startup, journaled next to the store
pub enum Stream {
    Memory(MemoryStream),
    Journal(JournalStream),
}

/// Subdirectory of the journal directory holding the command stream
const STREAM_DIR: &str = "commands";

impl Store {
    pub fn open(journal_dir: Option<&Path>) -> anyhow::Result<Self> {
        match journal_dir {
            Some(dir) => {
                tracing::info!(dir = %dir.display(), "Using journal store");
                let store = JournalStore::open(JournalConfig::new(dir)).context("opening store journal")?;
                Ok(Store::Journal(store))
            }
            None => {
                tracing::warn!("No journal directory configured, state is kept in memory only");
                Ok(Store::Memory(MemoryStore::new()))
            }
        }
    }
}

impl Stream {
    pub async fn open(journal_dir: Option<&Path>) -> anyhow::Result<Self> {
        match journal_dir {
            Some(dir) => {
                let dir = dir.join(STREAM_DIR);
                tracing::info!(dir = %dir.display(), "Using journaled command stream");
                let stream = JournalStream::open(JournalConfig::new(dir))
                    .await
                    .context("opening command journal")?;
                Ok(Stream::Journal(stream))
            }
            None => Ok(Stream::Memory(MemoryStream::new())),
        }
    }
}

macro_rules! delegate {
    ($self:ident, $store:ident => $call:expr) => {
        match $self {
            Store::Memory($store) => $call.await,
            Store::Journal($store) => $call.await,
        }
    };
}

macro_rules! delegate_stream {
    ($self:ident, $stream:ident => $call:expr) => {
        match $self {
            Stream::Memory($stream) => $call.await,
            Stream::Journal($stream) => $call.await,
        }
    };
}

#[async_trait]
impl CommandStream for Stream {
    async fn enqueue(&self, symbol: &Symbol, command: Command) -> Result<CommandId, StreamError> {
        delegate_stream!(self, stream => stream.enqueue(symbol, command))
    }

    async fn consume_next(&self, symbol: &Symbol) -> Result<(CommandEnvelope, AckHandle), StreamError> {
        delegate_stream!(self, stream => stream.consume_next(symbol))
    }

    async fn ack(&self, handle: AckHandle) -> Result<(), StreamError> {
        delegate_stream!(self, stream => stream.ack(handle))
    }

    async fn redeliver_unacked(&self, symbol: &Symbol) -> Result<usize, StreamError> {
        delegate_stream!(self, stream => stream.redeliver_unacked(symbol))
    }
}

#[async_trait]
impl PersistenceAdapter for Store {
    async fn save_order(&self, order: &Order) -> Result<(), PersistenceError> {
        delegate!(self, store => store.save_order(order))
    }

    async fn save_trade(&self, trade: &Trade) -> Result<(), PersistenceError> {
        delegate!(self, store => store.save_trade(trade))
    }

    async fn load_open_orders(&self, symbol: &Symbol) -> Result<Vec<Order>, PersistenceError> {
        delegate!(self, store => store.load_open_orders(symbol))
    }

    async fn commit(&self, batch: &CommitBatch) -> Result<CommitStatus, PersistenceError> {
        delegate!(self, store => store.commit(batch))
    }

    async fn is_committed(&self, command_id: &CommandId) -> Result<bool, PersistenceError> {
        delegate!(self, store => store.is_committed(command_id))
    }

    async fn last_trade_sequence(&self, symbol: &Symbol) -> Result<u64, PersistenceError> {
        delegate!(self, store => store.last_trade_sequence(symbol))
    }

    async fn load_order(&self, order_id: &OrderId) -> Result<Option<Order>, PersistenceError> {
        delegate!(self, store => store.load_order(order_id))
    }
}
