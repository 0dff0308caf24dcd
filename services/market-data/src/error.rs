use thiserror::Error;

use crate::channel::Topic;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("The event field is an incorrect type.")]
    BadEvent,

    #[error("The event is unsupported.")]
    UnsupportedEvent(String),

    #[error("The params have incorrect field types.")]
    BadParams,

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("Unauthorized.")]
    Unauthorized,

    #[error("Max subscriptions ({max}) reached")]
    TooManySubscriptions { max: usize },

    #[error("Not subscribed to {0}")]
    NotSubscribed(Topic),

    #[error("Client too slow, {dropped} messages dropped")]
    SlowConsumer { dropped: u64 },

    #[error("Internal server error.")]
    Internal,
}
