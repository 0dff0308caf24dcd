//! Commands placed on the per-instrument ordered stream

use crate::ids::{CommandId, OrderId, Symbol, UserId};
use crate::order::Order;
use serde::{Deserialize, Serialize};

/// Unit of work applied by an instrument's worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    NewOrder(Order),
    CancelOrder {
        order_id: OrderId,
        symbol: Symbol,
        user_id: UserId,
    },
}

impl Command {
    pub fn symbol(&self) -> &Symbol {
        match self {
            Command::NewOrder(order) => &order.symbol,
            Command::CancelOrder { symbol, .. } => symbol,
        }
    }

    /// User that issued the command
    pub fn user_id(&self) -> UserId {
        match self {
            Command::NewOrder(order) => order.user_id,
            Command::CancelOrder { user_id, .. } => *user_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Command::NewOrder(_) => "NEW_ORDER",
            Command::CancelOrder { .. } => "CANCEL_ORDER",
        }
    }
}

/// Command plus the metadata assigned when it was enqueued
///
/// `command_id` is the idempotency key for commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub command_id: CommandId,
    pub symbol: Symbol,
    pub enqueued_at: i64, // Unix nanos
    pub command: Command,
}

impl CommandEnvelope {
    pub fn new(command: Command, enqueued_at: i64) -> Self {
        Self {
            command_id: CommandId::new(),
            symbol: command.symbol().clone(),
            enqueued_at,
            command,
        }
    }
}
