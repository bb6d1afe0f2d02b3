//! Per-exchange incremental depth decoders.
//!
//! Each supported exchange family gets one `UpdateDecoder` implementation
//! that normalizes its native depth messages into `IncrementalUpdate`
//! records, so the sync engine stays exchange-agnostic.

pub mod binance;
pub mod decoder;
pub mod error;
pub mod okx;

pub use binance::BinanceDecoder;
pub use decoder::{decoder_for, DecodeStats, UpdateDecoder};
pub use error::{FeedError, FeedResult};
pub use okx::OkxDecoder;
