//! Market Data Service
//!
//! Fan-out of committed exchange state to subscribers:
//! - Book updates (top of book, checksummed depth, level deltas)
//! - Public trade tape
//! - Private order events per user
//!
//! Delivery is best-effort and at-most-once. Each topic is a bounded
//! broadcast channel; lagging subscribers skip the oldest messages.
//!
//! # Architecture
//!
//! ```text
//! Instrument workers
//!        │  Broadcaster
//!    ┌───▼────┐
//!    │  Hub   │  ← one broadcast channel per topic, latest book cache
//!    └───┬────┘
//!        │
//!   ┌────┴─────┬────────────┐
//!   │          │            │
//! ┌─▼──┐  ┌───▼───┐  ┌────▼────┐
//! │book│  │trades │  │ user    │
//! └─┬──┘  └───┬───┘  └────┬────┘
//!   │         │            │
//! ┌─▼─────────▼────────────▼──┐
//! │ Sessions (dedup, queue)   │
//! └───────────────────────────┘
//! ```

pub mod backpressure;
pub mod channel;
pub mod delta;
pub mod error;
pub mod events;
pub mod hub;
pub mod publisher;
pub mod session;
pub mod snapshot;
pub mod trades;

pub use channel::Topic;
pub use delta::BookFeed;
pub use error::SubscriptionError;
pub use events::{BookUpdate, StreamEvent, StreamPayload};
pub use hub::BroadcastHub;
pub use publisher::Broadcaster;
pub use session::{Session, SessionConfig};
