use exchange::ExchangeService;
use market_data::{BroadcastHub, SessionConfig};
use std::sync::Arc;

use crate::store::{Store, Stream};

pub type Exchange = ExchangeService<Store, Stream, BroadcastHub>;

#[derive(Clone)]
pub struct AppState {
    pub exchange: Arc<Exchange>,
    pub hub: Arc<BroadcastHub>,
    pub session: SessionConfig,
}

impl AppState {
    pub fn new(exchange: Arc<Exchange>, hub: Arc<BroadcastHub>, session: SessionConfig) -> Self {
        Self {
            exchange,
            hub,
            session,
        }
    }
}
