//! Persistence Service
//!
//! Durable storage behind narrow traits:
//! - [`PersistenceAdapter`]: orders, trades and committed command ids
//! - [`CommandStream`]: per-instrument ordered command queue with redelivery
//!
//! Implementations: [`MemoryStore`] and [`MemoryStream`] for tests and
//! single-process runs, [`JournalStore`] and [`JournalStream`] for
//! append-only CRC32C-framed journals that are replayed on startup.

pub mod adapter;
pub mod index;
pub mod journal;
pub mod journal_store;
pub mod journal_stream;
pub mod memory;
pub mod queue;
pub mod reader;

pub use adapter::{CommitBatch, CommitStatus, PersistenceAdapter, PersistenceError};
pub use journal::JournalConfig;
pub use journal_store::JournalStore;
pub use journal_stream::JournalStream;
pub use memory::MemoryStore;
pub use queue::{AckHandle, CommandStream, MemoryStream, StreamError};
