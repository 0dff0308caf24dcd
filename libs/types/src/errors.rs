//! Order validation and lifecycle errors

use crate::order::RejectReason;
use thiserror::Error;

/// Order-specific errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrderError {
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("Order already in terminal state: {status}")]
    AlreadyTerminal { status: String },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Fill of {fill} exceeds remaining {remaining}")]
    Overfill { fill: String, remaining: String },

    #[error("Order is for {actual}, expected {expected}")]
    SymbolMismatch { expected: String, actual: String },

    #[error("Only limit orders can rest in the book")]
    NotRestable,

    #[error("Level total {total} cannot absorb {added}")]
    QuantityOverflow { total: String, added: String },
}

impl OrderError {
    /// Reason recorded on an order rejected for this error
    pub fn reject_reason(&self) -> RejectReason {
        match self {
            OrderError::InvalidPrice(_) | OrderError::NotRestable => RejectReason::InvalidPrice,
            OrderError::InvalidSymbol(_) | OrderError::SymbolMismatch { .. } => {
                RejectReason::InvalidSymbol
            }
            _ => RejectReason::InvalidQuantity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reject_reason_mapping() {
        assert_eq!(
            OrderError::InvalidPrice("0".into()).reject_reason(),
            RejectReason::InvalidPrice
        );
        assert_eq!(
            OrderError::SymbolMismatch {
                expected: "AAPL".into(),
                actual: "MSFT".into()
            }
            .reject_reason(),
            RejectReason::InvalidSymbol
        );
        assert_eq!(
            OrderError::InvalidQuantity("-1".into()).reject_reason(),
            RejectReason::InvalidQuantity
        );
    }
}
