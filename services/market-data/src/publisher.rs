//! Publishing side of the fan-out layer
//!
//! Publishing never blocks and never fails the caller: delivery is
//! best-effort and at-most-once.

use matching_engine::OrderEvent;
use types::ids::{Symbol, UserId};
use types::trade::Trade;

use crate::events::BookUpdate;

pub trait Broadcaster: Send + Sync + 'static {
    /// Book channel of `symbol`
    fn publish_book_update(&self, symbol: &Symbol, update: BookUpdate);

    /// Trade channel of the trade's instrument
    fn publish_trade(&self, trade: &Trade);

    /// Private channel of `user_id`
    fn publish_user_event(&self, user_id: UserId, event: OrderEvent);
}

impl<B: Broadcaster> Broadcaster for std::sync::Arc<B> {
    fn publish_book_update(&self, symbol: &Symbol, update: BookUpdate) {
        (**self).publish_book_update(symbol, update)
    }

    fn publish_trade(&self, trade: &Trade) {
        (**self).publish_trade(trade)
    }

    fn publish_user_event(&self, user_id: UserId, event: OrderEvent) {
        (**self).publish_user_event(user_id, event)
    }
}
