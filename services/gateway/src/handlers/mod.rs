pub mod market;
pub mod order;
pub mod ws;
