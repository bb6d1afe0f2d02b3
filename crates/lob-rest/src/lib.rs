//! REST depth snapshot fetcher.
//!
//! Translates venue-native depth payloads into canonical
//! `OrderBookSnapshot` records: normalizes the sequence-id field name,
//! sorts both sides, and maps transport failures into the snapshot error
//! taxonomy. Retry/backoff is the caller's job, never this crate's.

pub mod client;
pub mod error;

pub use client::{RestConfig, SnapshotClient, SnapshotSource};
pub use error::{RestError, RestResult};
