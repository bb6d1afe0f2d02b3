//! Core domain types for the lob order book service.
//!
//! This crate provides fundamental types used throughout the system:
//! - `BookKey`: Unique identifier for a subscribed book (exchange + symbol)
//! - `Price`, `Size`: Precision-safe numeric types
//! - `OrderBook`: Ordered price-level container with diff-apply semantics
//! - `OrderBookSnapshot`, `IncrementalUpdate`: Canonical feed records

pub mod book;
pub mod decimal;
pub mod error;
pub mod market;
pub mod types;

pub use book::{BookDivergence, BookView, OrderBook, Side};
pub use decimal::{Price, Size};
pub use error::{CoreError, Result};
pub use market::{BookKey, ExchangeId, Symbol};
pub use types::{IncrementalUpdate, OrderBookSnapshot, PriceLevel, SyncPhase};
