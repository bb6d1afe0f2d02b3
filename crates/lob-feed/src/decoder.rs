//! Decoder trait and shared decode accounting.

use crate::error::FeedResult;
use crate::{BinanceDecoder, OkxDecoder};
use lob_core::{ExchangeId, IncrementalUpdate};
use std::sync::atomic::{AtomicU64, Ordering};

/// Decodes one raw feed message into a canonical incremental update.
///
/// Returns `Ok(None)` for messages that are well-formed but carry no depth
/// diff (subscription acks, heartbeats, other channels); those are dropped
/// without touching the failure counters. `Err` means the message was
/// malformed; the caller drops it, counts it, and forces a resync when
/// failures repeat.
pub trait UpdateDecoder: Send + Sync {
    /// The exchange this decoder understands.
    fn exchange(&self) -> ExchangeId;

    /// Parse one raw message.
    fn decode(&self, raw: &str) -> FeedResult<Option<IncrementalUpdate>>;

    /// Decode accounting, shared with the routing layer.
    fn stats(&self) -> &DecodeStats;
}

/// Construct the decoder for an exchange family.
pub fn decoder_for(exchange: ExchangeId) -> Box<dyn UpdateDecoder> {
    match exchange {
        ExchangeId::Binance => Box::new(BinanceDecoder::new()),
        ExchangeId::Okx => Box::new(OkxDecoder::new()),
    }
}

/// Decode accounting for one decoder.
#[derive(Debug, Default)]
pub struct DecodeStats {
    /// Messages decoded into an update.
    decoded: AtomicU64,
    /// Well-formed messages that carried no depth diff.
    ignored: AtomicU64,
    /// Malformed messages dropped.
    failed: AtomicU64,
}

impl DecodeStats {
    pub fn record_decoded(&self) {
        self.decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ignored(&self) {
        self.ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn decoded(&self) -> u64 {
        self.decoded.load(Ordering::Relaxed)
    }

    pub fn ignored(&self) -> u64 {
        self.ignored.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}
