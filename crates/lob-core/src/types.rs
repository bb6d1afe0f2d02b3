//! Canonical feed records.
//!
//! `OrderBookSnapshot` and `IncrementalUpdate` are the two records every
//! exchange payload is normalized into. Whatever the venue's native
//! sequencing scheme, an update always exposes a contiguous
//! `[first_update_id, last_update_id]` range so that one contiguity rule
//! (`first == previous_last + 1`) applies everywhere.

use crate::{BookKey, Price, Size};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single price level. `qty == 0` means "remove this level".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    pub price: Price,
    pub qty: Size,
}

impl PriceLevel {
    pub fn new(price: Price, qty: Size) -> Self {
        Self { price, qty }
    }

    /// Whether this diff deletes its level.
    pub fn is_removal(&self) -> bool {
        self.qty.is_zero()
    }
}

/// Full depth snapshot at a sequence point.
///
/// Bids are sorted descending and asks ascending by price; the fetcher
/// guarantees the ordering, the engine validates that the book is not
/// crossed before trusting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub key: BookKey,
    /// Exchange sequence id the snapshot was taken at.
    pub sequence: u64,
    /// Sorted descending by price.
    pub bids: Vec<PriceLevel>,
    /// Sorted ascending by price.
    pub asks: Vec<PriceLevel>,
    pub captured_at: DateTime<Utc>,
}

impl OrderBookSnapshot {
    /// Best bid price, if any depth on that side.
    pub fn best_bid(&self) -> Option<Price> {
        self.bids.first().map(|l| l.price)
    }

    /// Best ask price, if any depth on that side.
    pub fn best_ask(&self) -> Option<Price> {
        self.asks.first().map(|l| l.price)
    }

    /// A book is crossed when best bid >= best ask.
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => bid >= ask,
            _ => false,
        }
    }
}

/// One contiguous range of exchange-side book mutations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncrementalUpdate {
    pub key: BookKey,
    /// First mutation id covered by this message.
    pub first_update_id: u64,
    /// Last mutation id covered by this message.
    pub last_update_id: u64,
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
    /// Exchange event time, when the venue provides one.
    pub timestamp: Option<DateTime<Utc>>,
    /// Book checksum surfaced by pointer-chained feeds, unverified here.
    /// Verification against the merged book is the engine's job.
    pub checksum: Option<u32>,
}

impl IncrementalUpdate {
    /// Whether the update's range chains directly onto `last_applied`.
    pub fn is_contiguous_after(&self, last_applied: u64) -> bool {
        self.first_update_id == last_applied + 1
    }

    /// Whether the update's range covers the mutation after `last_applied`.
    ///
    /// Explicit-range venues emit overlapping ranges around the snapshot
    /// boundary; an update whose range spans `last_applied + 1` is still
    /// safely applicable because diffs are absolute replacements.
    pub fn covers_next(&self, last_applied: u64) -> bool {
        self.first_update_id <= last_applied + 1 && self.last_update_id > last_applied
    }

    /// Whether the update only describes mutations at or before `last_applied`.
    pub fn is_stale(&self, last_applied: u64) -> bool {
        self.last_update_id <= last_applied
    }
}

/// Synchronization phase of one book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncPhase {
    /// No trusted local book; updates are buffered.
    Unsynced,
    /// Snapshot obtained but not yet validated against the buffer.
    Syncing,
    /// Local book live; updates applied as they arrive.
    Synced,
    /// Repeated resync failure; requires an explicit reset.
    Error,
}

impl SyncPhase {
    /// Whether the local book is live and trustworthy.
    pub fn is_synced(&self) -> bool {
        matches!(self, Self::Synced)
    }

    /// Whether the phase needs a snapshot to make progress.
    pub fn needs_snapshot(&self) -> bool {
        matches!(self, Self::Unsynced | Self::Syncing)
    }
}

impl std::fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unsynced => write!(f, "UNSYNCED"),
            Self::Syncing => write!(f, "SYNCING"),
            Self::Synced => write!(f, "SYNCED"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ExchangeId;
    use rust_decimal_macros::dec;

    fn key() -> BookKey {
        BookKey::new(ExchangeId::Binance, "BTCUSDT")
    }

    fn level(px: rust_decimal::Decimal, qty: rust_decimal::Decimal) -> PriceLevel {
        PriceLevel::new(Price::new(px), Size::new(qty))
    }

    fn update(first: u64, last: u64) -> IncrementalUpdate {
        IncrementalUpdate {
            key: key(),
            first_update_id: first,
            last_update_id: last,
            bids: vec![],
            asks: vec![],
            timestamp: None,
            checksum: None,
        }
    }

    #[test]
    fn test_crossed_snapshot() {
        let snap = OrderBookSnapshot {
            key: key(),
            sequence: 1,
            bids: vec![level(dec!(101), dec!(1))],
            asks: vec![level(dec!(100), dec!(1))],
            captured_at: Utc::now(),
        };
        assert!(snap.is_crossed());
    }

    #[test]
    fn test_one_sided_snapshot_not_crossed() {
        let snap = OrderBookSnapshot {
            key: key(),
            sequence: 1,
            bids: vec![level(dec!(100), dec!(1))],
            asks: vec![],
            captured_at: Utc::now(),
        };
        assert!(!snap.is_crossed());
    }

    #[test]
    fn test_update_range_predicates() {
        let u = update(106, 110);
        assert!(u.is_contiguous_after(105));
        assert!(u.covers_next(105));
        assert!(!u.is_stale(105));

        // Range starts past the next expected id: a gap.
        assert!(!update(107, 110).covers_next(105));

        // Wholly in the past: stale.
        assert!(update(100, 105).is_stale(105));

        // Overlapping range still covers the next id.
        assert!(update(104, 106).covers_next(105));
        assert!(!update(104, 106).is_contiguous_after(105));
    }

    #[test]
    fn test_removal_level() {
        assert!(level(dec!(99), dec!(0)).is_removal());
        assert!(!level(dec!(99), dec!(1)).is_removal());
    }

    #[test]
    fn test_phase_predicates() {
        assert!(SyncPhase::Synced.is_synced());
        assert!(SyncPhase::Unsynced.needs_snapshot());
        assert!(SyncPhase::Syncing.needs_snapshot());
        assert!(!SyncPhase::Error.needs_snapshot());
        assert_eq!(SyncPhase::Error.to_string(), "ERROR");
    }
}
