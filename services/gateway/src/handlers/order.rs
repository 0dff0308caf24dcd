use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::models::{CreateOrderRequest, OrderResponse};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use types::ids::{OrderId, Symbol};
use types::order::{Order, OrderKind};
use types::time::now_nanos;

pub const STATUS_PENDING: &str = "PENDING";
pub const STATUS_CANCEL_PENDING: &str = "CANCEL_PENDING";

pub fn parse_symbol(raw: &str) -> Result<Symbol, AppError> {
    Symbol::try_new(raw).ok_or_else(|| AppError::BadRequest(format!("Invalid symbol {:?}", raw)))
}

/// Enqueue a new order; fills and rejections arrive on the user channel
pub async fn create_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderResponse>), AppError> {
    let symbol = parse_symbol(&payload.symbol)?;
    let timestamp = now_nanos();

    let order = match payload.kind {
        OrderKind::Limit => {
            let price = payload
                .price
                .ok_or_else(|| AppError::BadRequest("Limit orders require a price".into()))?;
            Order::limit(user.user_id, symbol, payload.side, price, payload.quantity, timestamp)
        }
        OrderKind::Market => {
            Order::market(user.user_id, symbol, payload.side, payload.quantity, timestamp)
        }
    };
    let order_id = order.order_id;
    let symbol = order.symbol.clone();

    let command_id = state.exchange.submit_order(order).await?;
    tracing::info!(%order_id, %command_id, %symbol, user_id = %user.user_id, "Order enqueued");

    Ok((
        StatusCode::ACCEPTED,
        Json(OrderResponse {
            order_id,
            command_id,
            symbol,
            status: STATUS_PENDING.to_string(),
        }),
    ))
}

/// Enqueue a cancel; ownership is checked when the command is processed
pub async fn cancel_order(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path((symbol, order_id)): Path<(String, String)>,
) -> Result<(StatusCode, Json<OrderResponse>), AppError> {
    let symbol = parse_symbol(&symbol)?;
    let order_id: OrderId = order_id
        .parse()
        .map_err(|_| AppError::BadRequest(format!("Invalid order id {:?}", order_id)))?;

    let command_id = state
        .exchange
        .cancel_order(order_id, symbol.clone(), user.user_id)
        .await?;
    tracing::info!(%order_id, %command_id, %symbol, user_id = %user.user_id, "Cancel enqueued");

    Ok((
        StatusCode::ACCEPTED,
        Json(OrderResponse {
            order_id,
            command_id,
            symbol,
            status: STATUS_CANCEL_PENDING.to_string(),
        }),
    ))
}
