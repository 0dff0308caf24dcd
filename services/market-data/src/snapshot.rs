//! Checksummed depth snapshots
//!
//! Every book update carries the aggregated top N levels and a SHA-256
//! checksum over them so clients applying deltas can verify their copy.

use matching_engine::book::{Depth, LevelView};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use types::ids::Symbol;

/// Aggregated depth of one instrument at a given book version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookSnapshot {
    pub symbol: Symbol,
    /// Book version, incremented once per published update
    pub version: u64,
    /// Best first
    pub bids: Vec<LevelView>,
    /// Best first
    pub asks: Vec<LevelView>,
    pub timestamp: i64,
    /// Lowercase hex SHA-256
    pub checksum: String,
}

impl BookSnapshot {
    pub fn new(symbol: Symbol, version: u64, depth: Depth, timestamp: i64) -> Self {
        let checksum = compute_checksum(&depth.bids, &depth.asks, version);
        Self {
            symbol,
            version,
            bids: depth.bids,
            asks: depth.asks,
            timestamp,
            checksum,
        }
    }

    /// Whether the checksum matches the levels
    pub fn verify(&self) -> bool {
        self.checksum == compute_checksum(&self.bids, &self.asks, self.version)
    }

    pub fn depth(&self) -> Depth {
        Depth {
            bids: self.bids.clone(),
            asks: self.asks.clone(),
        }
    }
}

fn compute_checksum(bids: &[LevelView], asks: &[LevelView], version: u64) -> String {
    let mut hasher = Sha256::new();

    for level in bids {
        hasher.update(level.price.to_string().as_bytes());
        hasher.update(b":");
        hasher.update(level.quantity.to_string().as_bytes());
        hasher.update(b"|");
    }
    hasher.update(b"---");

    for level in asks {
        hasher.update(level.price.to_string().as_bytes());
        hasher.update(b":");
        hasher.update(level.quantity.to_string().as_bytes());
        hasher.update(b"|");
    }
    hasher.update(b"---");

    hasher.update(version.to_le_bytes());

    format!("{:x}", hasher.finalize())
}
