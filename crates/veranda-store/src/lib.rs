//! # veranda-store
//!
//! The durable side of the relay: two wholesale-rewritten JSON maps for
//! last-seen records, and append-only per-day text logs of everything
//! that happened. Both are best-effort durability — callers treat every
//! write failure as non-fatal and keep their in-memory state authoritative.

pub mod chatlog;
pub mod lastseen;

mod error;

pub use chatlog::ChatLogSink;
pub use error::StoreError;
pub use lastseen::{LastSeenEntry, LastSeenStore};
