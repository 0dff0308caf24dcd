//! Fixed-point decimal types for prices and quantities
//!
//! Uses rust_decimal for deterministic arithmetic (no floating-point errors).
//! Both types serialize as decimal strings.
//!
//! Deserialization is transparent and does not validate: a price or quantity
//! arriving from the wire may be zero or negative. Orders are validated when
//! they reach the book (see `Order::validate`).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Largest price an order may carry
pub const MAX_PRICE: u64 = 1_000_000_000_000;

/// Largest quantity an order may carry
///
/// Together with [`MAX_PRICE`] this keeps price * quantity and per-level
/// totals well inside `Decimal` range.
pub const MAX_QUANTITY: u64 = 1_000_000_000_000_000;

/// Errors parsing or constructing numeric values
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NumericError {
    #[error("not a decimal number: {0}")]
    Parse(String),

    #[error("price must be positive, got {0}")]
    NonPositivePrice(Decimal),

    #[error("quantity must not be negative, got {0}")]
    NegativeQuantity(Decimal),
}

/// Limit price of an order (strictly positive when valid)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// Create a price, returning None unless it is strictly positive
    pub fn try_new(value: Decimal) -> Option<Self> {
        if value > Decimal::ZERO {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Wrap a decimal without validation (used for wire decoding and tests)
    pub fn new_unchecked(value: Decimal) -> Self {
        Self(value)
    }

    pub fn from_u64(value: u64) -> Self {
        Self(Decimal::from(value))
    }

    /// Parse a positive price from a decimal string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, NumericError> {
        let value: Decimal = s.parse().map_err(|_| NumericError::Parse(s.to_string()))?;
        Self::try_new(value).ok_or(NumericError::NonPositivePrice(value))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    /// Whether the price is strictly positive
    pub fn is_valid(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn exceeds_max(&self) -> bool {
        self.0 > Decimal::from(MAX_PRICE)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Order or trade quantity (zero allowed for remaining quantities)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(Decimal);

impl Quantity {
    /// Create a quantity, returning None if negative
    pub fn try_new(value: Decimal) -> Option<Self> {
        if value >= Decimal::ZERO {
            Some(Self(value))
        } else {
            None
        }
    }

    /// Wrap a decimal without validation (used for wire decoding and tests)
    pub fn new_unchecked(value: Decimal) -> Self {
        Self(value)
    }

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn from_u64(value: u64) -> Self {
        Self(Decimal::from(value))
    }

    /// Parse a non-negative quantity from a decimal string
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Result<Self, NumericError> {
        let value: Decimal = s.parse().map_err(|_| NumericError::Parse(s.to_string()))?;
        Self::try_new(value).ok_or(NumericError::NegativeQuantity(value))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Whether the quantity is strictly positive
    pub fn is_positive(&self) -> bool {
        self.0 > Decimal::ZERO
    }

    pub fn exceeds_max(&self) -> bool {
        self.0 > Decimal::from(MAX_QUANTITY)
    }

    /// Add, returning None on `Decimal` overflow
    pub fn checked_add(self, other: Quantity) -> Option<Quantity> {
        self.0.checked_add(other.0).map(Quantity)
    }

    /// Subtract, returning None if the result would be negative
    pub fn checked_sub(self, other: Quantity) -> Option<Quantity> {
        Self::try_new(self.0 - other.0)
    }

    pub fn min(self, other: Quantity) -> Quantity {
        if self.0 <= other.0 {
            self
        } else {
            other
        }
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
