use crate::error::AppError;
use crate::handlers::order::parse_symbol;
use crate::models::InstrumentsResponse;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
};
use market_data::BookUpdate;

pub async fn list_instruments(State(state): State<AppState>) -> Json<InstrumentsResponse> {
    Json(InstrumentsResponse {
        instruments: state.exchange.instruments().await,
    })
}

/// Latest published book; the live book belongs to the instrument worker
pub async fn get_book(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<BookUpdate>, AppError> {
    let symbol = parse_symbol(&symbol)?;
    state
        .hub
        .latest_book(&symbol)
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No book for {}", symbol)))
}

pub async fn ping() -> &'static str {
    "pong"
}
