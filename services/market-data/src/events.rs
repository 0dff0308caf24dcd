//! Stream events pushed to subscribers
//!
//! Instrument channels carry `exchange.stream_info` events, user channels
//! carry `exchange.stream_user_private_info`. Every event has a sequence
//! that is strictly increasing per channel; sessions use it to drop
//! duplicates.

use matching_engine::book::TopOfBook;
use matching_engine::OrderEvent;
use serde::{Deserialize, Serialize};
use types::ids::Symbol;

use crate::channel::Topic;
use crate::delta::LevelDelta;
use crate::snapshot::BookSnapshot;
use crate::trades::PublicTrade;

pub const EVENT_STREAM_INFO: &str = "exchange.stream_info";
pub const EVENT_STREAM_USER_PRIVATE_INFO: &str = "exchange.stream_user_private_info";

/// Book state after one committed command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookUpdate {
    pub symbol: Symbol,
    pub version: u64,
    pub top: TopOfBook,
    pub snapshot: BookSnapshot,
    /// Changes against the previous update
    pub deltas: Vec<LevelDelta>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StreamPayload {
    Book(BookUpdate),
    Trade(PublicTrade),
    Order(OrderEvent),
}

/// Envelope of every pushed message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    pub event: String,
    pub channel: Topic,
    pub sequence: u64,
    pub timestamp: i64,
    pub payload: StreamPayload,
}

impl StreamEvent {
    pub fn new(channel: Topic, sequence: u64, timestamp: i64, payload: StreamPayload) -> Self {
        let event = if channel.is_private() {
            EVENT_STREAM_USER_PRIVATE_INFO
        } else {
            EVENT_STREAM_INFO
        };
        Self {
            event: event.to_string(),
            channel,
            sequence,
            timestamp,
            payload,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
