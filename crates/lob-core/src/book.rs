//! Local order book container.
//!
//! Each side is a `BTreeMap<Price, Size>`, so per-side price ordering is
//! structural; the invariant the engine has to verify after a merge is only
//! that the book is not crossed. Diffs are absolute replacements: a non-zero
//! quantity overwrites the level, a zero quantity deletes it.

use crate::types::{IncrementalUpdate, OrderBookSnapshot, PriceLevel, SyncPhase};
use crate::{BookKey, Price, Size};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Book side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Bid,
    Ask,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bid => write!(f, "bid"),
            Self::Ask => write!(f, "ask"),
        }
    }
}

/// Ordered price→quantity mapping for both sides of one book.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderBook {
    bids: BTreeMap<Price, Size>,
    asks: BTreeMap<Price, Size>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace all contents from a snapshot. Zero-quantity snapshot levels
    /// are skipped (some venues pad the tail of the requested depth).
    pub fn load_snapshot(&mut self, snapshot: &OrderBookSnapshot) {
        self.bids.clear();
        self.asks.clear();
        for l in &snapshot.bids {
            if l.qty.is_positive() {
                self.bids.insert(l.price, l.qty);
            }
        }
        for l in &snapshot.asks {
            if l.qty.is_positive() {
                self.asks.insert(l.price, l.qty);
            }
        }
    }

    /// Apply one level diff to one side.
    pub fn apply_level(&mut self, side: Side, level: &PriceLevel) {
        let map = match side {
            Side::Bid => &mut self.bids,
            Side::Ask => &mut self.asks,
        };
        if level.is_removal() {
            map.remove(&level.price);
        } else {
            map.insert(level.price, level.qty);
        }
    }

    /// Apply every diff in an update, both sides.
    pub fn apply(&mut self, update: &IncrementalUpdate) {
        for l in &update.bids {
            self.apply_level(Side::Bid, l);
        }
        for l in &update.asks {
            self.apply_level(Side::Ask, l);
        }
    }

    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids
            .iter()
            .next_back()
            .map(|(p, q)| PriceLevel::new(*p, *q))
    }

    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks
            .iter()
            .next()
            .map(|(p, q)| PriceLevel::new(*p, *q))
    }

    /// A book is crossed when best bid >= best ask. One-sided and empty
    /// books are not crossed.
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => bid.price >= ask.price,
            _ => false,
        }
    }

    pub fn bid_depth(&self) -> usize {
        self.bids.len()
    }

    pub fn ask_depth(&self) -> usize {
        self.asks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    pub fn clear(&mut self) {
        self.bids.clear();
        self.asks.clear();
    }

    /// Top-of-book levels: bids descending, asks ascending.
    pub fn top_levels(&self, depth: usize) -> (Vec<PriceLevel>, Vec<PriceLevel>) {
        let bids = self
            .bids
            .iter()
            .rev()
            .take(depth)
            .map(|(p, q)| PriceLevel::new(*p, *q))
            .collect();
        let asks = self
            .asks
            .iter()
            .take(depth)
            .map(|(p, q)| PriceLevel::new(*p, *q))
            .collect();
        (bids, asks)
    }

    /// Compare against an independently fetched snapshot at the same
    /// sequence point. Only the depth covered by both is compared (the
    /// local book may carry more levels than the snapshot was requested
    /// with). Returns the first divergence found.
    pub fn diff_against_snapshot(&self, snapshot: &OrderBookSnapshot) -> Option<BookDivergence> {
        let (bids, asks) = self.top_levels(usize::MAX);
        if let Some(d) = Self::diff_side(Side::Bid, &bids, &snapshot.bids) {
            return Some(d);
        }
        Self::diff_side(Side::Ask, &asks, &snapshot.asks)
    }

    fn diff_side(side: Side, local: &[PriceLevel], remote: &[PriceLevel]) -> Option<BookDivergence> {
        let depth = local.len().min(remote.len());
        for (rank, (l, r)) in local.iter().zip(remote.iter()).take(depth).enumerate() {
            if l != r {
                return Some(BookDivergence {
                    side,
                    rank,
                    local: *l,
                    remote: *r,
                });
            }
        }
        None
    }

    /// Point-in-time immutable copy for readers.
    pub fn view(&self, key: BookKey, phase: SyncPhase, sequence: u64) -> BookView {
        let (bids, asks) = self.top_levels(usize::MAX);
        BookView {
            key,
            phase,
            sequence,
            bids,
            asks,
            captured_at: Utc::now(),
        }
    }
}

/// First level at which a local book and an audit snapshot disagree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookDivergence {
    pub side: Side,
    /// Rank from the top of the side (0 = best).
    pub rank: usize,
    pub local: PriceLevel,
    pub remote: PriceLevel,
}

impl std::fmt::Display for BookDivergence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} level {}: local {}@{} vs remote {}@{}",
            self.side,
            self.rank,
            self.local.qty,
            self.local.price,
            self.remote.qty,
            self.remote.price
        )
    }
}

/// Immutable point-in-time copy of one book, handed to readers.
///
/// Readers never receive live references into actor state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookView {
    pub key: BookKey,
    pub phase: SyncPhase,
    pub sequence: u64,
    /// Sorted descending by price.
    pub bids: Vec<PriceLevel>,
    /// Sorted ascending by price.
    pub asks: Vec<PriceLevel>,
    pub captured_at: DateTime<Utc>,
}

impl BookView {
    pub fn best_bid(&self) -> Option<PriceLevel> {
        self.bids.first().copied()
    }

    pub fn best_ask(&self) -> Option<PriceLevel> {
        self.asks.first().copied()
    }
}
