//! Trade execution logic
//!
//! Generates trades with per-instrument sequence numbers.

use types::ids::Symbol;
use types::numeric::Quantity;
use types::order::Order;
use types::trade::Trade;

/// Trade generator for one instrument
#[derive(Debug, Clone)]
pub struct MatchExecutor {
    last_sequence: u64,
}

impl MatchExecutor {
    /// Resume numbering after `last_sequence` (0 for a fresh instrument)
    pub fn new(last_sequence: u64) -> Self {
        Self { last_sequence }
    }

    /// Sequence of the most recent trade
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    fn next_sequence(&mut self) -> u64 {
        self.last_sequence += 1;
        self.last_sequence
    }

    /// Execute a trade between the aggressor and a resting order
    ///
    /// The execution price is always the resting order's price.
    pub fn execute_trade(
        &mut self,
        symbol: &Symbol,
        aggressor: &Order,
        resting: &Order,
        quantity: Quantity,
        timestamp: i64,
    ) -> Option<Trade> {
        let price = resting.price?;
        let sequence = self.next_sequence();

        Some(Trade::new(
            sequence,
            symbol.clone(),
            aggressor.order_id,
            resting.order_id,
            aggressor.user_id,
            resting.user_id,
            aggressor.side,
            price,
            quantity,
            timestamp,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::ids::UserId;
    use types::numeric::Price;
    use types::order::Side;

    fn limit(side: Side, price: u64) -> Order {
        Order::limit(
            UserId::new(),
            Symbol::new("AAPL"),
            side,
            Price::from_u64(price),
            Quantity::from_u64(10),
            1708123456789000000,
        )
    }

    #[test]
    fn test_execute_trade_at_resting_price() {
        let mut executor = MatchExecutor::new(0);
        let aggressor = limit(Side::BUY, 105);
        let resting = limit(Side::SELL, 100);

        let trade = executor
            .execute_trade(&Symbol::new("AAPL"), &aggressor, &resting, Quantity::from_u64(4), 1)
            .unwrap();

        assert_eq!(trade.sequence, 1);
        assert_eq!(trade.price, Price::from_u64(100));
        assert_eq!(trade.aggressor_order_id, aggressor.order_id);
        assert_eq!(trade.resting_order_id, resting.order_id);
        assert_eq!(trade.aggressor_side, Side::BUY);
    }

    #[test]
    fn test_sequence_resumes_after_restart() {
        let mut executor = MatchExecutor::new(41);
        let aggressor = limit(Side::SELL, 100);
        let resting = limit(Side::BUY, 100);

        let first = executor
            .execute_trade(&Symbol::new("AAPL"), &aggressor, &resting, Quantity::from_u64(1), 1)
            .unwrap();
        let second = executor
            .execute_trade(&Symbol::new("AAPL"), &aggressor, &resting, Quantity::from_u64(1), 2)
            .unwrap();

        assert_eq!(first.sequence, 42);
        assert_eq!(second.sequence, 43);
        assert_eq!(executor.last_sequence(), 43);
    }
}
