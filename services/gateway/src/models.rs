use serde::{Deserialize, Serialize};
use types::ids::{CommandId, OrderId, Symbol};
use types::numeric::{Price, Quantity};
use types::order::{OrderKind, Side};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    pub symbol: String,
    pub side: Side,
    #[serde(default = "default_kind")]
    pub kind: OrderKind,
    /// Required for limit orders, ignored for market orders
    pub price: Option<Price>,
    pub quantity: Quantity,
}

fn default_kind() -> OrderKind {
    OrderKind::Limit
}

/// Acknowledges acceptance into the pipeline, not execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResponse {
    pub order_id: OrderId,
    pub command_id: CommandId,
    pub symbol: Symbol,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstrumentsResponse {
    pub instruments: Vec<Symbol>,
}
