//! Order book infrastructure module
//!
//! Contains price levels, the two book sides and the per-instrument book.

pub mod ask_book;
pub mod bid_book;
pub mod order_book;
pub mod price_level;

pub use ask_book::AskBook;
pub use bid_book::BidBook;
pub use order_book::OrderBook;
pub use price_level::PriceLevel;

use serde::{Deserialize, Serialize};
use types::numeric::{Price, Quantity};

/// Aggregated view of one price level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelView {
    pub price: Price,
    pub quantity: Quantity,
    pub order_count: usize,
}

impl LevelView {
    pub fn new(price: Price, level: &PriceLevel) -> Self {
        Self {
            price,
            quantity: level.total_quantity(),
            order_count: level.order_count(),
        }
    }
}

/// Best bid and best ask
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TopOfBook {
    pub best_bid: Option<LevelView>,
    pub best_ask: Option<LevelView>,
}

/// Top N aggregated levels per side, best first
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Depth {
    pub bids: Vec<LevelView>,
    pub asks: Vec<LevelView>,
}
