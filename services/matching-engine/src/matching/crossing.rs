//! Crossing detection logic
//!
//! Determines when an incoming order can trade against the resting best.

use types::numeric::Price;
use types::order::Side;

/// Check if a bid and ask can match at given prices
pub fn can_match(bid_price: Price, ask_price: Price) -> bool {
    bid_price >= ask_price
}

/// Check if an incoming order crosses a resting price
///
/// A market order (no limit) crosses any resting price.
pub fn incoming_can_match(incoming_side: Side, limit: Option<Price>, resting_price: Price) -> bool {
    match (incoming_side, limit) {
        (_, None) => true,
        (Side::BUY, Some(price)) => can_match(price, resting_price),
        (Side::SELL, Some(price)) => can_match(resting_price, price),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_match_crossing() {
        assert!(can_match(Price::from_u64(50000), Price::from_u64(49000)));
        assert!(can_match(Price::from_u64(50000), Price::from_u64(50000)));
        assert!(!can_match(Price::from_u64(49000), Price::from_u64(50000)));
    }

    #[test]
    fn test_incoming_buy_can_match() {
        assert!(incoming_can_match(Side::BUY, Some(Price::from_u64(100)), Price::from_u64(100)));
        assert!(!incoming_can_match(Side::BUY, Some(Price::from_u64(99)), Price::from_u64(100)));
    }

    #[test]
    fn test_incoming_sell_can_match() {
        assert!(incoming_can_match(Side::SELL, Some(Price::from_u64(99)), Price::from_u64(100)));
        assert!(!incoming_can_match(Side::SELL, Some(Price::from_u64(101)), Price::from_u64(100)));
    }

    #[test]
    fn test_market_always_crosses() {
        assert!(incoming_can_match(Side::BUY, None, Price::from_u64(1_000_000)));
        assert!(incoming_can_match(Side::SELL, None, Price::from_u64(1)));
    }
}
