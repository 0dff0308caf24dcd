//! Journal-backed command stream
//!
//! Enqueues and acks are appended to a journal of their own before the
//! in-memory queue changes. Opening the stream replays that journal and
//! queues every command that was never acknowledged, in enqueue order, so
//! a command accepted before a crash is delivered again after it.

use async_trait::async_trait;
use std::collections::HashSet;
use tokio::sync::Mutex;
use tracing::{debug, info};
use types::command::{Command, CommandEnvelope};
use types::ids::{CommandId, Symbol};
use types::time::now_nanos;

use crate::journal::{JournalConfig, JournalError, JournalRecord, JournalWriter};
use crate::queue::{AckHandle, CommandStream, MemoryStream, StreamError};
use crate::reader::{JournalReader, ReaderError};

impl From<JournalError> for StreamError {
    fn from(e: JournalError) -> Self {
        StreamError::Journal(e.to_string())
    }
}

impl From<ReaderError> for StreamError {
    fn from(e: ReaderError) -> Self {
        StreamError::Journal(e.to_string())
    }
}

impl From<std::io::Error> for StreamError {
    fn from(e: std::io::Error) -> Self {
        StreamError::Journal(e.to_string())
    }
}

pub struct JournalStream {
    /// Held across the queue update so journal order matches queue order
    writer: Mutex<JournalWriter>,
    queue: MemoryStream,
}

impl JournalStream {
    /// Replay the journal in `config.dir` and requeue unacknowledged commands
    pub async fn open(config: JournalConfig) -> Result<Self, StreamError> {
        let replay = JournalReader::open(&config.dir)?.replay()?;
        if let Some(torn) = &replay.torn_tail {
            torn.truncate()?;
        }

        let mut enqueued = Vec::new();
        let mut acked = HashSet::new();
        for entry in &replay.entries {
            match entry.record()? {
                JournalRecord::Enqueued(envelope) => enqueued.push(envelope),
                JournalRecord::Acked(command_id) => {
                    acked.insert(command_id);
                }
                _ => {
                    return Err(StreamError::Journal(format!(
                        "unexpected {} record at sequence {}",
                        entry.kind, entry.sequence
                    )))
                }
            }
        }

        let queue = MemoryStream::new();
        let total = enqueued.len();
        let mut requeued = 0usize;
        for envelope in enqueued {
            if !acked.contains(&envelope.command_id) {
                queue.push(envelope).await;
                requeued += 1;
            }
        }

        let mut writer = JournalWriter::open(config)?;
        writer.set_next_sequence(replay.last_sequence() + 1);
        info!(commands = total, requeued, "Command stream recovered");

        Ok(Self {
            writer: Mutex::new(writer),
            queue,
        })
    }

    /// Commands waiting to be consumed
    pub async fn pending_len(&self, symbol: &Symbol) -> usize {
        self.queue.pending_len(symbol).await
    }

    /// Commands consumed but not acknowledged
    pub async fn in_flight_len(&self, symbol: &Symbol) -> usize {
        self.queue.in_flight_len(symbol).await
    }
}

#[async_trait]
impl CommandStream for JournalStream {
    async fn enqueue(&self, symbol: &Symbol, command: Command) -> Result<CommandId, StreamError> {
        if command.symbol() != symbol {
            return Err(StreamError::SymbolMismatch {
                expected: symbol.clone(),
                actual: command.symbol().clone(),
            });
        }
        let envelope = CommandEnvelope::new(command, now_nanos());
        let command_id = envelope.command_id;

        let mut writer = self.writer.lock().await;
        writer.write_record(envelope.enqueued_at, &JournalRecord::Enqueued(envelope.clone()))?;
        self.queue.push(envelope).await;
        drop(writer);

        debug!(%symbol, %command_id, "Command journaled");
        Ok(command_id)
    }

    async fn consume_next(&self, symbol: &Symbol) -> Result<(CommandEnvelope, AckHandle), StreamError> {
        self.queue.consume_next(symbol).await
    }

    async fn ack(&self, handle: AckHandle) -> Result<(), StreamError> {
        let command_id = handle.command_id;
        let mut writer = self.writer.lock().await;
        self.queue.ack(handle).await?;
        writer.write_record(now_nanos(), &JournalRecord::Acked(command_id))?;
        Ok(())
    }

    async fn redeliver_unacked(&self, symbol: &Symbol) -> Result<usize, StreamError> {
        self.queue.redeliver_unacked(symbol).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::io::Write;
    use tempfile::TempDir;
    use types::ids::{OrderId, UserId};

    fn cancel(symbol: &str) -> Command {
        Command::CancelOrder {
            order_id: OrderId::new(),
            symbol: Symbol::new(symbol),
            user_id: UserId::new(),
        }
    }

    #[tokio::test]
    async fn test_unacked_commands_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let aapl = Symbol::new("AAPL");
        let msft = Symbol::new("MSFT");
        let (done, kept, in_flight, other) = {
            let stream = JournalStream::open(JournalConfig::new(dir.path())).await.unwrap();
            let done = stream.enqueue(&aapl, cancel("AAPL")).await.unwrap();
            let in_flight = stream.enqueue(&aapl, cancel("AAPL")).await.unwrap();
            let kept = stream.enqueue(&aapl, cancel("AAPL")).await.unwrap();
            let other = stream.enqueue(&msft, cancel("MSFT")).await.unwrap();

            let (_, ack) = stream.consume_next(&aapl).await.unwrap();
            stream.ack(ack).await.unwrap();
            // Consumed, never acknowledged
            let (envelope, _) = stream.consume_next(&aapl).await.unwrap();
            assert_eq!(envelope.command_id, in_flight);
            (done, kept, in_flight, other)
        };

        let stream = JournalStream::open(JournalConfig::new(dir.path())).await.unwrap();
        assert_eq!(stream.pending_len(&aapl).await, 2);
        assert_eq!(stream.pending_len(&msft).await, 1);

        let (first, _) = stream.consume_next(&aapl).await.unwrap();
        let (second, _) = stream.consume_next(&aapl).await.unwrap();
        assert_eq!((first.command_id, second.command_id), (in_flight, kept));
        assert_ne!(first.command_id, done);
        let (msft_next, _) = stream.consume_next(&msft).await.unwrap();
        assert_eq!(msft_next.command_id, other);
    }

    #[tokio::test]
    async fn test_reopen_keeps_appending() {
        let dir = TempDir::new().unwrap();
        let aapl = Symbol::new("AAPL");
        {
            let stream = JournalStream::open(JournalConfig::new(dir.path())).await.unwrap();
            stream.enqueue(&aapl, cancel("AAPL")).await.unwrap();
        }
        {
            let stream = JournalStream::open(JournalConfig::new(dir.path())).await.unwrap();
            let (_, ack) = stream.consume_next(&aapl).await.unwrap();
            stream.ack(ack).await.unwrap();
            stream.enqueue(&aapl, cancel("AAPL")).await.unwrap();
        }

        let stream = JournalStream::open(JournalConfig::new(dir.path())).await.unwrap();
        assert_eq!(stream.pending_len(&aapl).await, 1);
    }

    #[tokio::test]
    async fn test_torn_enqueue_is_dropped() {
        let dir = TempDir::new().unwrap();
        let aapl = Symbol::new("AAPL");
        let kept = {
            let stream = JournalStream::open(JournalConfig::new(dir.path())).await.unwrap();
            stream.enqueue(&aapl, cancel("AAPL")).await.unwrap()
        };
        let path = crate::journal::journal_path(dir.path(), 0);
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[0x40, 0, 0, 0, 1, 2, 3]).unwrap();
        drop(file);

        let stream = JournalStream::open(JournalConfig::new(dir.path())).await.unwrap();
        assert_eq!(stream.pending_len(&aapl).await, 1);
        let (envelope, _) = stream.consume_next(&aapl).await.unwrap();
        assert_eq!(envelope.command_id, kept);
        stream.enqueue(&aapl, cancel("AAPL")).await.unwrap();
    }

    #[tokio::test]
    async fn test_symbol_mismatch_not_journaled() {
        let dir = TempDir::new().unwrap();
        let stream = JournalStream::open(JournalConfig::new(dir.path())).await.unwrap();
        let result = stream.enqueue(&Symbol::new("AAPL"), cancel("MSFT")).await;
        assert!(matches!(result, Err(StreamError::SymbolMismatch { .. })));
        drop(stream);

        let stream = JournalStream::open(JournalConfig::new(dir.path())).await.unwrap();
        assert_eq!(stream.pending_len(&Symbol::new("MSFT")).await, 0);
    }

    #[tokio::test]
    async fn test_store_records_refused() {
        let dir = TempDir::new().unwrap();
        {
            let mut writer = JournalWriter::open(JournalConfig::new(dir.path())).unwrap();
            let batch = crate::adapter::CommitBatch::empty(CommandId::new(), Symbol::new("AAPL"), 1);
            writer.write_record(1, &JournalRecord::Commit(batch)).unwrap();
        }
        let result = JournalStream::open(JournalConfig::new(dir.path())).await;
        assert!(matches!(result, Err(StreamError::Journal(_))));
    }
}
