//! Durable ordered command stream
//!
//! Commands are FIFO per instrument. A consumed command stays in flight
//! until it is acknowledged; [`CommandStream::redeliver_unacked`] puts
//! in-flight commands back at the head of the queue in their original order.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, Notify, RwLock};
use tracing::debug;
use types::command::{Command, CommandEnvelope};
use types::ids::{CommandId, Symbol};
use types::time::now_nanos;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StreamError {
    #[error("Command for {actual} enqueued on stream {expected}")]
    SymbolMismatch { expected: Symbol, actual: Symbol },

    #[error("Unknown delivery {delivery_tag} for command {command_id}")]
    UnknownDelivery {
        command_id: CommandId,
        delivery_tag: u64,
    },

    #[error("Stream closed")]
    Closed,

    #[error("Stream journal error: {0}")]
    Journal(String),
}

/// Receipt for a consumed command, used to acknowledge it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckHandle {
    pub symbol: Symbol,
    pub command_id: CommandId,
    pub delivery_tag: u64,
}

/// Ordered, redeliverable stream of commands keyed by instrument
#[async_trait]
pub trait CommandStream: Send + Sync + 'static {
    async fn enqueue(&self, symbol: &Symbol, command: Command) -> Result<CommandId, StreamError>;

    /// Wait for the next command of an instrument
    ///
    /// Cancel-safe: dropping the future before it resolves never loses a command.
    async fn consume_next(&self, symbol: &Symbol) -> Result<(CommandEnvelope, AckHandle), StreamError>;

    async fn ack(&self, handle: AckHandle) -> Result<(), StreamError>;

    /// Requeue every unacknowledged command; returns how many
    async fn redeliver_unacked(&self, symbol: &Symbol) -> Result<usize, StreamError>;
}

#[derive(Debug, Default)]
struct Queue {
    pending: VecDeque<CommandEnvelope>,
    in_flight: BTreeMap<u64, CommandEnvelope>,
    next_tag: u64,
}

#[derive(Debug, Default)]
struct Channel {
    queue: Mutex<Queue>,
    notify: Notify,
}

/// In-process command stream
#[derive(Debug, Default)]
pub struct MemoryStream {
    channels: RwLock<HashMap<Symbol, Arc<Channel>>>,
}

impl MemoryStream {
    pub fn new() -> Self {
        Self::default()
    }

    async fn channel(&self, symbol: &Symbol) -> Arc<Channel> {
        if let Some(channel) = self.channels.read().await.get(symbol) {
            return channel.clone();
        }
        self.channels
            .write()
            .await
            .entry(symbol.clone())
            .or_default()
            .clone()
    }

    /// Append an already stamped command to its instrument's queue
    pub(crate) async fn push(&self, envelope: CommandEnvelope) {
        let channel = self.channel(&envelope.symbol).await;
        channel.queue.lock().await.pending.push_back(envelope);
        channel.notify.notify_one();
    }

    /// Commands waiting to be consumed
    pub async fn pending_len(&self, symbol: &Symbol) -> usize {
        self.channel(symbol).await.queue.lock().await.pending.len()
    }

    /// Commands consumed but not acknowledged
    pub async fn in_flight_len(&self, symbol: &Symbol) -> usize {
        self.channel(symbol).await.queue.lock().await.in_flight.len()
    }
}

#[async_trait]
impl CommandStream for MemoryStream {
    async fn enqueue(&self, symbol: &Symbol, command: Command) -> Result<CommandId, StreamError> {
        if command.symbol() != symbol {
            return Err(StreamError::SymbolMismatch {
                expected: symbol.clone(),
                actual: command.symbol().clone(),
            });
        }
        let envelope = CommandEnvelope::new(command, now_nanos());
        let command_id = envelope.command_id;
        self.push(envelope).await;

        debug!(%symbol, %command_id, "Command enqueued");
        Ok(command_id)
    }

    async fn consume_next(&self, symbol: &Symbol) -> Result<(CommandEnvelope, AckHandle), StreamError> {
        let channel = self.channel(symbol).await;
        loop {
            let notified = channel.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut queue = channel.queue.lock().await;
                if let Some(envelope) = queue.pending.pop_front() {
                    let delivery_tag = queue.next_tag;
                    queue.next_tag += 1;
                    queue.in_flight.insert(delivery_tag, envelope.clone());
                    let handle = AckHandle {
                        symbol: symbol.clone(),
                        command_id: envelope.command_id,
                        delivery_tag,
                    };
                    return Ok((envelope, handle));
                }
            }

            notified.await;
        }
    }

    async fn ack(&self, handle: AckHandle) -> Result<(), StreamError> {
        let channel = self.channel(&handle.symbol).await;
        let mut queue = channel.queue.lock().await;
        match queue.in_flight.remove(&handle.delivery_tag) {
            Some(envelope) if envelope.command_id == handle.command_id => Ok(()),
            Some(envelope) => {
                queue.in_flight.insert(handle.delivery_tag, envelope);
                Err(StreamError::UnknownDelivery {
                    command_id: handle.command_id,
                    delivery_tag: handle.delivery_tag,
                })
            }
            None => Err(StreamError::UnknownDelivery {
                command_id: handle.command_id,
                delivery_tag: handle.delivery_tag,
            }),
        }
    }

    async fn redeliver_unacked(&self, symbol: &Symbol) -> Result<usize, StreamError> {
        let channel = self.channel(symbol).await;
        let count = {
            let mut queue = channel.queue.lock().await;
            let in_flight = std::mem::take(&mut queue.in_flight);
            let count = in_flight.len();
            for (_, envelope) in in_flight.into_iter().rev() {
                queue.pending.push_front(envelope);
            }
            count
        };
        if count > 0 {
            debug!(%symbol, count, "Redelivering unacknowledged commands");
            channel.notify.notify_one();
        }
        Ok(count)
    }
}
