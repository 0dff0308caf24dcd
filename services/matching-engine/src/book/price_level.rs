//! Price level implementation with FIFO queue
//!
//! A price level contains all resting orders at one price point.
//! Orders keep their arrival order, which gives time priority.

use std::collections::VecDeque;
use types::errors::OrderError;
use types::ids::OrderId;
use types::numeric::Quantity;

/// A price level containing orders at a specific price
#[derive(Debug, Clone)]
pub struct PriceLevel {
    /// Queue of orders at this price level (FIFO order)
    orders: VecDeque<OrderEntry>,
    /// Total quantity available at this level
    total_quantity: Quantity,
}

/// Entry in the price level queue
#[derive(Debug, Clone)]
struct OrderEntry {
    order_id: OrderId,
    remaining_quantity: Quantity,
}

impl PriceLevel {
    /// Create a new empty price level
    pub fn new() -> Self {
        Self {
            orders: VecDeque::new(),
            total_quantity: Quantity::zero(),
        }
    }

    /// Insert an order at the back of the queue (time priority)
    ///
    /// Fails without changing the level if the total would overflow.
    pub fn insert(&mut self, order_id: OrderId, quantity: Quantity) -> Result<(), OrderError> {
        let total = self.total_quantity.checked_add(quantity).ok_or_else(|| {
            OrderError::QuantityOverflow {
                total: self.total_quantity.to_string(),
                added: quantity.to_string(),
            }
        })?;
        self.orders.push_back(OrderEntry {
            order_id,
            remaining_quantity: quantity,
        });
        self.total_quantity = total;
        Ok(())
    }

    /// Remove an order from the queue by OrderId
    ///
    /// Returns the remaining quantity of the removed order, or None if not found
    pub fn remove(&mut self, order_id: &OrderId) -> Option<Quantity> {
        let position = self.orders.iter().position(|entry| &entry.order_id == order_id)?;
        let entry = self.orders.remove(position)?;
        self.subtract_total(entry.remaining_quantity);
        Some(entry.remaining_quantity)
    }

    /// Decrement an order's remaining quantity, dropping it at zero
    ///
    /// Returns the new remaining quantity, or None if the order is absent
    /// or the reduction exceeds what is left.
    pub fn reduce(&mut self, order_id: &OrderId, filled: Quantity) -> Option<Quantity> {
        let position = self.orders.iter().position(|entry| &entry.order_id == order_id)?;
        let entry = self.orders.get_mut(position)?;
        let remaining = entry.remaining_quantity.checked_sub(filled)?;

        if remaining.is_zero() {
            self.orders.remove(position);
        } else {
            entry.remaining_quantity = remaining;
        }
        self.subtract_total(filled);
        Some(remaining)
    }

    /// Peek at the front order id without removing it
    pub fn peek_front(&self) -> Option<OrderId> {
        self.orders.front().map(|entry| entry.order_id)
    }

    /// Order ids in time priority
    pub fn order_ids(&self) -> impl Iterator<Item = OrderId> + '_ {
        self.orders.iter().map(|entry| entry.order_id)
    }

    fn subtract_total(&mut self, quantity: Quantity) {
        self.total_quantity = self
            .total_quantity
            .checked_sub(quantity)
            .unwrap_or_else(Quantity::zero);
    }

    /// Check if the price level is empty
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Get the total quantity at this price level
    pub fn total_quantity(&self) -> Quantity {
        self.total_quantity
    }

    /// Get the number of orders at this level
    pub fn order_count(&self) -> usize {
        self.orders.len()
    }
}

impl Default for PriceLevel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn qty(s: &str) -> Quantity {
        Quantity::from_str(s).unwrap()
    }

    #[test]
    fn test_price_level_insert() {
        let mut level = PriceLevel::new();
        level.insert(OrderId::new(), qty("1.5")).unwrap();

        assert_eq!(level.order_count(), 1);
        assert_eq!(level.total_quantity(), qty("1.5"));
        assert!(!level.is_empty());
    }

    #[test]
    fn test_price_level_fifo_order() {
        let mut level = PriceLevel::new();
        let order1 = OrderId::new();
        let order2 = OrderId::new();
        let order3 = OrderId::new();

        level.insert(order1, qty("1.0")).unwrap();
        level.insert(order2, qty("2.0")).unwrap();
        level.insert(order3, qty("3.0")).unwrap();

        assert_eq!(level.peek_front(), Some(order1));
        assert_eq!(level.order_ids().collect::<Vec<_>>(), vec![order1, order2, order3]);
    }

    #[test]
    fn test_price_level_remove() {
        let mut level = PriceLevel::new();
        let order1 = OrderId::new();
        let order2 = OrderId::new();

        level.insert(order1, qty("1.0")).unwrap();
        level.insert(order2, qty("2.0")).unwrap();

        assert_eq!(level.remove(&order1), Some(qty("1.0")));
        assert_eq!(level.order_count(), 1);
        assert_eq!(level.total_quantity(), qty("2.0"));
        assert_eq!(level.remove(&order1), None);
    }

    #[test]
    fn test_price_level_reduce() {
        let mut level = PriceLevel::new();
        let order_id = OrderId::new();
        let behind = OrderId::new();

        level.insert(order_id, qty("5.0")).unwrap();
        level.insert(behind, qty("1.0")).unwrap();

        // Partial fill keeps queue position
        assert_eq!(level.reduce(&order_id, qty("2.0")), Some(qty("3.0")));
        assert_eq!(level.peek_front(), Some(order_id));
        assert_eq!(level.total_quantity(), qty("4.0"));

        // Fill to zero removes the entry
        assert_eq!(level.reduce(&order_id, qty("3.0")), Some(Quantity::zero()));
        assert_eq!(level.peek_front(), Some(behind));
        assert_eq!(level.total_quantity(), qty("1.0"));
    }

    #[test]
    fn test_price_level_total_overflow_rejected() {
        let mut level = PriceLevel::new();
        let first = OrderId::new();
        let huge = qty("50000000000000000000000000000");
        level.insert(first, huge).unwrap();

        let err = level.insert(OrderId::new(), huge).unwrap_err();
        assert!(matches!(err, OrderError::QuantityOverflow { .. }));
        assert_eq!(level.order_count(), 1);
        assert_eq!(level.total_quantity(), huge);
        assert_eq!(level.peek_front(), Some(first));
    }

    #[test]
    fn test_price_level_reduce_beyond_remaining() {
        let mut level = PriceLevel::new();
        let order_id = OrderId::new();
        level.insert(order_id, qty("1.0")).unwrap();

        assert_eq!(level.reduce(&order_id, qty("2.0")), None);
        assert_eq!(level.total_quantity(), qty("1.0"));
    }
}
