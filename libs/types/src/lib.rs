//! Types library for the exchange
//!
//! Core type definitions shared by every service: identifiers, decimal
//! prices and quantities, orders, trades and stream commands.
//!
//! # Modules
//! - `ids`: Unique identifiers (OrderId, TradeId, UserId, CommandId, Symbol)
//! - `numeric`: Fixed-point decimal types (Price, Quantity)
//! - `order`: Order lifecycle types
//! - `trade`: Trade execution types
//! - `command`: Stream commands and their envelope
//! - `errors`: Order error taxonomy
//! - `time`: Exchange clock

pub mod command;
pub mod errors;
pub mod ids;
pub mod numeric;
pub mod order;
pub mod time;
pub mod trade;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::command::*;
    pub use crate::errors::*;
    pub use crate::ids::*;
    pub use crate::numeric::*;
    pub use crate::order::*;
    pub use crate::time::*;
    pub use crate::trade::*;
}
