//! OKX books-channel decoder.
//!
//! OKX depth pushes carry a single monotonically increasing `seqId` plus a
//! `prevSeqId` pointer to the previous push, and a CRC32 checksum over the
//! top of the merged book. The decoder exposes `prevSeqId + 1` as
//! `first_update_id` and `seqId` as `last_update_id`, so the engine applies
//! the same contiguity rule it uses for explicit-range feeds. The checksum
//! is surfaced unverified; verifying it against the merged book is the
//! engine's job.

use crate::decoder::{DecodeStats, UpdateDecoder};
use crate::error::{FeedError, FeedResult};
use chrono::{DateTime, Utc};
use lob_core::{BookKey, ExchangeId, IncrementalUpdate, Price, PriceLevel, Size};
use serde::Deserialize;
use tracing::{debug, warn};

/// Push envelope from the books channel.
#[derive(Debug, Deserialize)]
struct RawBooksPush {
    arg: RawArg,
    /// "snapshot" for the initial full push, "update" for diffs.
    #[serde(default)]
    action: Option<String>,
    data: Vec<RawBooksData>,
}

/// Channel argument; the channel name is checked before this struct is
/// deserialized.
#[derive(Debug, Deserialize)]
struct RawArg {
    #[serde(rename = "instId")]
    inst_id: String,
}

/// One depth entry. Levels are `[px, qty, deprecated, order_count]`;
/// only the first two elements matter.
#[derive(Debug, Deserialize)]
struct RawBooksData {
    #[serde(default)]
    bids: Vec<Vec<String>>,
    #[serde(default)]
    asks: Vec<Vec<String>>,
    /// Push time in milliseconds, as a string.
    #[serde(default)]
    ts: Option<String>,
    /// Signed CRC32 of the top 25 merged levels.
    #[serde(default)]
    checksum: Option<i64>,
    /// Sequence id of this push. Negative on venue-side resets.
    #[serde(rename = "seqId")]
    seq_id: i64,
    /// Sequence id of the previous push; -1 on snapshot pushes.
    #[serde(rename = "prevSeqId", default)]
    prev_seq_id: Option<i64>,
}

/// Decoder for OKX books pushes.
#[derive(Debug, Default)]
pub struct OkxDecoder {
    stats: DecodeStats,
}

impl OkxDecoder {
    pub fn new() -> Self {
        Self {
            stats: DecodeStats::default(),
        }
    }

    fn parse_levels(&self, raw: &[Vec<String>]) -> FeedResult<Vec<PriceLevel>> {
        raw.iter()
            .map(|entry| {
                if entry.len() < 2 {
                    return Err(FeedError::InvalidLevel(format!("level {entry:?}")));
                }
                let price: Price = entry[0]
                    .parse()
                    .map_err(|_| FeedError::InvalidLevel(format!("price {:?}", entry[0])))?;
                let qty: Size = entry[1]
                    .parse()
                    .map_err(|_| FeedError::InvalidLevel(format!("qty {:?}", entry[1])))?;
                Ok(PriceLevel::new(price, qty))
            })
            .collect()
    }
}

impl UpdateDecoder for OkxDecoder {
    fn exchange(&self) -> ExchangeId {
        ExchangeId::Okx
    }

    fn decode(&self, raw: &str) -> FeedResult<Option<IncrementalUpdate>> {
        let value: serde_json::Value = serde_json::from_str(raw).map_err(|e| {
            self.stats.record_failed();
            FeedError::Json(e)
        })?;

        // Subscription acks and errors carry an "event" field, not data.
        if value.get("event").is_some() {
            self.stats.record_ignored();
            return Ok(None);
        }

        let Some(channel) = value
            .get("arg")
            .and_then(|a| a.get("channel"))
            .and_then(|c| c.as_str())
        else {
            self.stats.record_ignored();
            return Ok(None);
        };
        if !channel.starts_with("books") {
            self.stats.record_ignored();
            return Ok(None);
        }

        let push: RawBooksPush = serde_json::from_value(value).map_err(|e| {
            self.stats.record_failed();
            FeedError::Malformed(format!("books push: {e}"))
        })?;

        let Some(data) = push.data.first() else {
            self.stats.record_failed();
            return Err(FeedError::Malformed("books push with empty data".into()));
        };
        if push.data.len() > 1 {
            warn!(
                inst = %push.arg.inst_id,
                entries = push.data.len(),
                "books push with multiple entries, decoding the first"
            );
        }

        if data.seq_id < 0 {
            // Venue-side sequence reset; chaining is broken.
            self.stats.record_failed();
            return Err(FeedError::Malformed(format!(
                "negative seqId {}",
                data.seq_id
            )));
        }

        // A snapshot push points at nothing (prevSeqId == -1); expose it as
        // a range starting at zero so the engine's stale rule handles it.
        let first_update_id = match data.prev_seq_id {
            Some(prev) if prev >= 0 => prev as u64 + 1,
            _ => {
                if push.action.as_deref() != Some("snapshot") {
                    self.stats.record_failed();
                    return Err(FeedError::Malformed("update push without prevSeqId".into()));
                }
                0
            }
        };

        let bids = self.parse_levels(&data.bids).map_err(|e| {
            self.stats.record_failed();
            e
        })?;
        let asks = self.parse_levels(&data.asks).map_err(|e| {
            self.stats.record_failed();
            e
        })?;

        let timestamp = data
            .ts
            .as_deref()
            .and_then(|ts| ts.parse::<i64>().ok())
            .and_then(DateTime::<Utc>::from_timestamp_millis);

        let update = IncrementalUpdate {
            key: BookKey::new(ExchangeId::Okx, push.arg.inst_id),
            first_update_id,
            last_update_id: data.seq_id as u64,
            bids,
            asks,
            timestamp,
            checksum: data.checksum.map(|c| c as u32),
        };

        self.stats.record_decoded();
        debug!(
            key = %update.key,
            first = update.first_update_id,
            last = update.last_update_id,
            has_checksum = update.checksum.is_some(),
            "books push decoded"
        );
        Ok(Some(update))
    }

    fn stats(&self) -> &DecodeStats {
        &self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(decoder: &OkxDecoder, value: serde_json::Value) -> FeedResult<Option<IncrementalUpdate>> {
        decoder.decode(&value.to_string())
    }

    #[test]
    fn test_decode_update_push() {
        let decoder = OkxDecoder::new();
        let result = decode(
            &decoder,
            json!({
                "arg": {"channel": "books", "instId": "BTC-USDT"},
                "action": "update",
                "data": [{
                    "bids": [["100.0", "1.5", "0", "3"]],
                    "asks": [["101.0", "0", "0", "0"]],
                    "ts": "1597026383085",
                    "checksum": -855196043i64,
                    "prevSeqId": 500,
                    "seqId": 501
                }]
            }),
        )
        .unwrap()
        .unwrap();

        assert_eq!(result.key.to_string(), "okx:BTC-USDT");
        // prevSeqId 500 surfaces as first id 501: one contiguity rule for
        // both exchange families.
        assert_eq!(result.first_update_id, 501);
        assert_eq!(result.last_update_id, 501);
        assert!(result.asks[0].is_removal());
        assert_eq!(result.checksum, Some((-855196043i64) as u32));
        assert!(result.timestamp.is_some());
    }

    #[test]
    fn test_decode_snapshot_push() {
        let decoder = OkxDecoder::new();
        let result = decode(
            &decoder,
            json!({
                "arg": {"channel": "books", "instId": "BTC-USDT"},
                "action": "snapshot",
                "data": [{
                    "bids": [["100.0", "1", "0", "1"]],
                    "asks": [["101.0", "1", "0", "1"]],
                    "ts": "1597026383085",
                    "checksum": 12345,
                    "prevSeqId": -1,
                    "seqId": 700
                }]
            }),
        )
        .unwrap()
        .unwrap();

        assert_eq!(result.first_update_id, 0);
        assert_eq!(result.last_update_id, 700);
    }

    #[test]
    fn test_subscribe_ack_ignored() {
        let decoder = OkxDecoder::new();
        let result = decode(
            &decoder,
            json!({"event": "subscribe", "arg": {"channel": "books", "instId": "BTC-USDT"}}),
        )
        .unwrap();
        assert!(result.is_none());
        assert_eq!(decoder.stats().ignored(), 1);
    }

    #[test]
    fn test_other_channel_ignored() {
        let decoder = OkxDecoder::new();
        let result = decode(
            &decoder,
            json!({
                "arg": {"channel": "tickers", "instId": "BTC-USDT"},
                "data": [{"last": "100"}]
            }),
        )
        .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_negative_seq_id_rejected() {
        let decoder = OkxDecoder::new();
        let result = decode(
            &decoder,
            json!({
                "arg": {"channel": "books", "instId": "BTC-USDT"},
                "action": "update",
                "data": [{"bids": [], "asks": [], "prevSeqId": 5, "seqId": -1}]
            }),
        );
        assert!(matches!(result, Err(FeedError::Malformed(_))));
        assert_eq!(decoder.stats().failed(), 1);
    }

    #[test]
    fn test_update_without_pointer_rejected() {
        let decoder = OkxDecoder::new();
        let result = decode(
            &decoder,
            json!({
                "arg": {"channel": "books", "instId": "BTC-USDT"},
                "action": "update",
                "data": [{"bids": [], "asks": [], "seqId": 10}]
            }),
        );
        assert!(matches!(result, Err(FeedError::Malformed(_))));
    }

    #[test]
    fn test_short_level_rejected() {
        let decoder = OkxDecoder::new();
        let result = decode(
            &decoder,
            json!({
                "arg": {"channel": "books", "instId": "BTC-USDT"},
                "action": "update",
                "data": [{"bids": [["100.0"]], "asks": [], "prevSeqId": 1, "seqId": 2}]
            }),
        );
        assert!(matches!(result, Err(FeedError::InvalidLevel(_))));
    }
}
