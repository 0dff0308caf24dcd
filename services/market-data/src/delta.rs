//! Level deltas between consecutive book publishes
//!
//! Delta flow:
//! 1. The worker hands the post-command depth to [`BookFeed::next_update`]
//! 2. The feed diffs it against the depth it published last
//! 3. The resulting update carries the deltas, a fresh snapshot and the
//!    next book version

use std::collections::BTreeMap;

use matching_engine::book::{Depth, TopOfBook};
use serde::{Deserialize, Serialize};
use types::ids::Symbol;
use types::numeric::{Price, Quantity};
use types::order::Side;

use crate::events::BookUpdate;
use crate::snapshot::BookSnapshot;

/// Change of one aggregated price level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelDelta {
    pub side: Side,
    pub price: Price,
    /// Previously published quantity (zero for a new level)
    pub old_quantity: Quantity,
    /// Zero when the level is gone
    pub new_quantity: Quantity,
}

impl LevelDelta {
    pub fn is_removal(&self) -> bool {
        self.new_quantity.is_zero()
    }

    pub fn is_new_level(&self) -> bool {
        self.old_quantity.is_zero()
    }
}

type Levels = BTreeMap<(Side, Price), Quantity>;

fn flatten(depth: &Depth) -> Levels {
    let bids = depth.bids.iter().map(|l| ((Side::BUY, l.price), l.quantity));
    let asks = depth.asks.iter().map(|l| ((Side::SELL, l.price), l.quantity));
    bids.chain(asks).collect()
}

/// Levels that differ between two depth views
///
/// Ordered by side (BUY first) then ascending price. Unchanged levels are
/// left out.
pub fn diff_levels(before: &Depth, after: &Depth) -> Vec<LevelDelta> {
    let before = flatten(before);
    let after = flatten(after);
    let mut deltas = Vec::new();

    for (&(side, price), &old_quantity) in &before {
        let new_quantity = after.get(&(side, price)).copied().unwrap_or_else(Quantity::zero);
        if new_quantity != old_quantity {
            deltas.push(LevelDelta {
                side,
                price,
                old_quantity,
                new_quantity,
            });
        }
    }
    for (&(side, price), &new_quantity) in &after {
        if !before.contains_key(&(side, price)) {
            deltas.push(LevelDelta {
                side,
                price,
                old_quantity: Quantity::zero(),
                new_quantity,
            });
        }
    }

    deltas.sort_by_key(|d| (d.side, d.price));
    deltas
}

/// Per-instrument producer of book updates
#[derive(Debug)]
pub struct BookFeed {
    symbol: Symbol,
    version: u64,
    previous: Depth,
}

impl BookFeed {
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            version: 0,
            previous: Depth::default(),
        }
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Build the next update from the current book views
    pub fn next_update(&mut self, top: TopOfBook, depth: Depth, timestamp: i64) -> BookUpdate {
        self.version += 1;
        let deltas = diff_levels(&self.previous, &depth);
        let snapshot = BookSnapshot::new(self.symbol.clone(), self.version, depth.clone(), timestamp);
        self.previous = depth;

        BookUpdate {
            symbol: self.symbol.clone(),
            version: self.version,
            top,
            snapshot,
            deltas,
        }
    }
}
