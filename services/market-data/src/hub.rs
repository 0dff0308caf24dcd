//! In-process fan-out hub
//!
//! One bounded tokio broadcast channel per topic. A slow receiver never
//! holds up the publisher: once it falls `capacity` messages behind, the
//! oldest messages are overwritten and the receiver skips ahead.
//!
//! The hub also caches the latest book update per instrument. Subscribing
//! to a book channel returns that cached update together with a receiver
//! that sees every later update.
//!
//! Trade and private topics exist only while they have receivers; sessions
//! prune them when they let go.

use std::sync::Arc;

use dashmap::DashMap;
use matching_engine::OrderEvent;
use tokio::sync::broadcast;
use tracing::debug;
use types::ids::{Symbol, UserId};
use types::time::now_nanos;
use types::trade::Trade;

use crate::channel::Topic;
use crate::events::{BookUpdate, StreamEvent, StreamPayload};
use crate::publisher::Broadcaster;
use crate::trades::PublicTrade;

pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

struct TopicState {
    sender: broadcast::Sender<Arc<StreamEvent>>,
    sequence: u64,
}

impl TopicState {
    fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, sequence: 0 }
    }

    fn next_event(&mut self, topic: Topic, payload: StreamPayload) -> Arc<StreamEvent> {
        self.sequence += 1;
        Arc::new(StreamEvent::new(topic, self.sequence, now_nanos(), payload))
    }

    fn send(&self, event: &Arc<StreamEvent>) {
        match self.sender.send(event.clone()) {
            Ok(receivers) => {
                debug!(channel = %event.channel, sequence = event.sequence, receivers, "Published")
            }
            Err(_) => debug!(channel = %event.channel, sequence = event.sequence, "No subscribers"),
        }
    }
}

/// A receiver for one topic plus the snapshot to deliver first
pub struct Subscription {
    pub topic: Topic,
    pub receiver: broadcast::Receiver<Arc<StreamEvent>>,
    pub snapshot: Option<Arc<StreamEvent>>,
}

pub struct BroadcastHub {
    capacity: usize,
    topics: DashMap<Topic, TopicState>,
    latest_books: DashMap<Symbol, Arc<StreamEvent>>,
}

impl BroadcastHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            topics: DashMap::new(),
            latest_books: DashMap::new(),
        }
    }

    /// Attach to a topic
    pub fn subscribe(&self, topic: &Topic) -> Subscription {
        let entry = self
            .topics
            .entry(topic.clone())
            .or_insert_with(|| TopicState::new(self.capacity));
        let receiver = entry.sender.subscribe();
        // Read under the topic lock so no update falls between snapshot and receiver
        let snapshot = match topic {
            Topic::Book(symbol) => self.latest_books.get(symbol).map(|e| e.value().clone()),
            _ => None,
        };
        drop(entry);

        debug!(%topic, "Subscribed");
        Subscription {
            topic: topic.clone(),
            receiver,
            snapshot,
        }
    }

    /// Send a payload on a topic; returns the event as sent
    ///
    /// Book topics are always kept so the snapshot cache and its sequence
    /// stay in step. Trade and private topics are only sent to while
    /// somebody listens; without subscribers nothing is stored.
    pub fn publish(&self, topic: Topic, payload: StreamPayload) -> Option<Arc<StreamEvent>> {
        if let Topic::Book(symbol) = &topic {
            let mut entry = self
                .topics
                .entry(topic.clone())
                .or_insert_with(|| TopicState::new(self.capacity));
            let event = entry.next_event(topic.clone(), payload);
            if matches!(event.payload, StreamPayload::Book(_)) {
                self.latest_books.insert(symbol.clone(), event.clone());
            }
            entry.send(&event);
            return Some(event);
        }

        match self.topics.get_mut(&topic) {
            Some(mut entry) if entry.sender.receiver_count() > 0 => {
                let event = entry.next_event(topic, payload);
                entry.send(&event);
                Some(event)
            }
            _ => {
                debug!(channel = %topic, "No subscribers");
                None
            }
        }
    }

    /// Forget a non-book topic once its last receiver is gone
    pub fn prune(&self, topic: &Topic) -> bool {
        if matches!(topic, Topic::Book(_)) {
            return false;
        }
        let removed = self
            .topics
            .remove_if(topic, |_, state| state.sender.receiver_count() == 0)
            .is_some();
        if removed {
            debug!(%topic, "Pruned idle topic");
        }
        removed
    }

    /// Number of topics with a live channel
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    /// Latest book update published for an instrument
    pub fn latest_book(&self, symbol: &Symbol) -> Option<BookUpdate> {
        self.latest_books.get(symbol).and_then(|event| match &event.payload {
            StreamPayload::Book(update) => Some(update.clone()),
            _ => None,
        })
    }

    pub fn subscriber_count(&self, topic: &Topic) -> usize {
        self.topics
            .get(topic)
            .map(|state| state.sender.receiver_count())
            .unwrap_or(0)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl Broadcaster for BroadcastHub {
    fn publish_book_update(&self, symbol: &Symbol, update: BookUpdate) {
        self.publish(Topic::Book(symbol.clone()), StreamPayload::Book(update));
    }

    fn publish_trade(&self, trade: &Trade) {
        self.publish(
            Topic::Trades(trade.symbol.clone()),
            StreamPayload::Trade(PublicTrade::from(trade)),
        );
    }

    fn publish_user_event(&self, user_id: UserId, event: OrderEvent) {
        self.publish(Topic::User(user_id), StreamPayload::Order(event));
    }
}
