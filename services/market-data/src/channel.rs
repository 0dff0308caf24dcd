//! Subscription channels and the WebSocket request/response envelope
//!
//! Channel strings:
//! - `book@AAPL`: top of book, depth snapshot and level deltas
//! - `trades@AAPL`: public trade tape
//! - `user@<user id>`: private order events of one user

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use types::ids::{Symbol, UserId};

use crate::error::SubscriptionError;

/// A fan-out topic
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Topic {
    Book(Symbol),
    Trades(Symbol),
    User(UserId),
}

impl Topic {
    /// Instrument the topic belongs to, if any
    pub fn symbol(&self) -> Option<&Symbol> {
        match self {
            Topic::Book(symbol) | Topic::Trades(symbol) => Some(symbol),
            Topic::User(_) => None,
        }
    }

    pub fn is_private(&self) -> bool {
        matches!(self, Topic::User(_))
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Book(symbol) => write!(f, "book@{}", symbol),
            Topic::Trades(symbol) => write!(f, "trades@{}", symbol),
            Topic::User(user_id) => write!(f, "user@{}", user_id),
        }
    }
}

impl FromStr for Topic {
    type Err = SubscriptionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || SubscriptionError::UnknownChannel(s.to_string());
        let (kind, target) = s.split_once('@').ok_or_else(unknown)?;
        match kind {
            "book" => Symbol::try_new(target).map(Topic::Book).ok_or_else(unknown),
            "trades" => Symbol::try_new(target).map(Topic::Trades).ok_or_else(unknown),
            "user" => target.parse().map(Topic::User).map_err(|_| unknown()),
            _ => Err(unknown()),
        }
    }
}

impl Serialize for Topic {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Topic {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Event names accepted from clients
pub mod request_events {
    pub const SUBSCRIBE: &str = "subscribe";
    pub const UNSUBSCRIBE: &str = "unsubscribe";
    pub const PING: &str = "ping";
    /// Book and trades of one instrument, `params: {"symbol": ...}`
    pub const STREAM_INFO: &str = "exchange.stream_info";
    /// The caller's own private channel
    pub const STREAM_USER_PRIVATE_INFO: &str = "exchange.stream_user_private_info";
}

/// Shape of every client message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub event: String,
    #[serde(default)]
    pub params: Value,
}

/// `params` of subscribe / unsubscribe
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelParams {
    pub channels: Vec<String>,
}

/// `params` of `exchange.stream_info`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolParams {
    pub symbol: String,
}

/// Reply to a client request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseBase {
    pub event: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ResponseBase {
    pub fn ok(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            success: true,
            error_message: None,
        }
    }

    pub fn error(event: impl Into<String>, error: &SubscriptionError) -> Self {
        Self {
            event: event.into(),
            success: false,
            error_message: Some(error.to_string()),
        }
    }
}

/// Parse a raw text frame into a request
pub fn parse_request(text: &str) -> Result<Request, SubscriptionError> {
    serde_json::from_str(text).map_err(|_| SubscriptionError::BadEvent)
}
