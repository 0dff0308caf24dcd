//! Per-session outbound queue
//!
//! Holds serialized messages waiting for the socket. The queue is bounded;
//! on overflow it either drops the oldest message or asks for the client to
//! be disconnected.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::channel::Topic;

/// Drop policy when a client's outbound queue overflows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DropPolicy {
    /// Disconnect the lagging client immediately.
    Disconnect,
    /// Drop oldest messages to make room for newer ones.
    #[default]
    DropOldest,
}

/// A queued outbound message for a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: Topic,
    pub sequence: u64,
    /// Serialized JSON
    pub payload: String,
}

/// Action to take when backpressure is triggered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackpressureAction {
    /// Client should be disconnected.
    DisconnectClient,
}

#[derive(Debug)]
pub struct ClientQueue {
    messages: VecDeque<OutboundMessage>,
    capacity: usize,
    drop_policy: DropPolicy,
    messages_dropped: u64,
    is_lagging: bool,
}

impl ClientQueue {
    pub fn new(capacity: usize, drop_policy: DropPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            messages: VecDeque::with_capacity(capacity),
            capacity,
            drop_policy,
            messages_dropped: 0,
            is_lagging: false,
        }
    }

    /// Enqueue a message. Returns Err if client should be disconnected.
    pub fn enqueue(&mut self, message: OutboundMessage) -> Result<(), BackpressureAction> {
        if self.messages.len() >= self.capacity {
            self.is_lagging = true;

            match self.drop_policy {
                DropPolicy::Disconnect => {
                    return Err(BackpressureAction::DisconnectClient);
                }
                DropPolicy::DropOldest => {
                    self.messages.pop_front();
                    self.messages_dropped += 1;
                }
            }
        }

        self.messages.push_back(message);

        // Clear lagging flag once below half capacity
        if self.messages.len() < self.capacity / 2 {
            self.is_lagging = false;
        }

        Ok(())
    }

    pub fn pop(&mut self) -> Option<OutboundMessage> {
        let message = self.messages.pop_front();
        if self.messages.len() < self.capacity / 2 {
            self.is_lagging = false;
        }
        message
    }

    /// Drop queued messages of one topic
    pub fn purge(&mut self, topic: &Topic) {
        self.messages.retain(|m| &m.topic != topic);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn is_lagging(&self) -> bool {
        self.is_lagging
    }

    /// Total messages dropped for this client.
    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped
    }
}
