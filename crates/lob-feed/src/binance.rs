//! Binance depth-stream decoder.
//!
//! Binance depth messages carry an explicit update-id range per event:
//! `U` (first id in event) and `u` (final id in event). The futures feed
//! additionally carries `pu` (previous final id); it is accepted but the
//! canonical contiguity contract is expressed through the `[U, u]` range.

use crate::decoder::{DecodeStats, UpdateDecoder};
use crate::error::{FeedError, FeedResult};
use chrono::{DateTime, Utc};
use lob_core::{BookKey, ExchangeId, IncrementalUpdate, Price, PriceLevel, Size};
use serde::Deserialize;
use tracing::debug;

/// Raw depth event from the Binance stream. The event type is checked
/// before this struct is deserialized.
#[derive(Debug, Deserialize)]
struct RawDepthUpdate {
    /// Event time in milliseconds.
    #[serde(rename = "E")]
    event_time: i64,
    #[serde(rename = "s")]
    symbol: String,
    /// First update id in event.
    #[serde(rename = "U")]
    first_update_id: u64,
    /// Final update id in event.
    #[serde(rename = "u")]
    final_update_id: u64,
    /// Previous event's final id (futures streams only).
    #[serde(rename = "pu", default)]
    #[allow(dead_code)]
    prev_final_id: Option<u64>,
    #[serde(rename = "b")]
    bids: Vec<[String; 2]>,
    #[serde(rename = "a")]
    asks: Vec<[String; 2]>,
}

/// Decoder for Binance depth streams.
#[derive(Debug, Default)]
pub struct BinanceDecoder {
    stats: DecodeStats,
}

impl BinanceDecoder {
    pub fn new() -> Self {
        Self {
            stats: DecodeStats::default(),
        }
    }

    fn parse_levels(&self, raw: &[[String; 2]]) -> FeedResult<Vec<PriceLevel>> {
        raw.iter()
            .map(|pair| {
                let price: Price = pair[0]
                    .parse()
                    .map_err(|_| FeedError::InvalidLevel(format!("price {:?}", pair[0])))?;
                let qty: Size = pair[1]
                    .parse()
                    .map_err(|_| FeedError::InvalidLevel(format!("qty {:?}", pair[1])))?;
                Ok(PriceLevel::new(price, qty))
            })
            .collect()
    }
}

impl UpdateDecoder for BinanceDecoder {
    fn exchange(&self) -> ExchangeId {
        ExchangeId::Binance
    }

    fn decode(&self, raw: &str) -> FeedResult<Option<IncrementalUpdate>> {
        let value: serde_json::Value = serde_json::from_str(raw).map_err(|e| {
            self.stats.record_failed();
            FeedError::Json(e)
        })?;

        // Subscription acks look like {"result": null, "id": 1}; anything
        // without an event type is not a stream payload.
        let Some(event) = value.get("e").and_then(|e| e.as_str()) else {
            self.stats.record_ignored();
            return Ok(None);
        };
        if event != "depthUpdate" {
            self.stats.record_ignored();
            return Ok(None);
        }

        let parsed: RawDepthUpdate = serde_json::from_value(value).map_err(|e| {
            self.stats.record_failed();
            FeedError::Malformed(format!("depthUpdate: {e}"))
        })?;

        if parsed.first_update_id > parsed.final_update_id {
            self.stats.record_failed();
            return Err(FeedError::Malformed(format!(
                "inverted update range [{}, {}]",
                parsed.first_update_id, parsed.final_update_id
            )));
        }

        let bids = self.parse_levels(&parsed.bids).map_err(|e| {
            self.stats.record_failed();
            e
        })?;
        let asks = self.parse_levels(&parsed.asks).map_err(|e| {
            self.stats.record_failed();
            e
        })?;

        let update = IncrementalUpdate {
            key: BookKey::new(ExchangeId::Binance, parsed.symbol),
            first_update_id: parsed.first_update_id,
            last_update_id: parsed.final_update_id,
            bids,
            asks,
            timestamp: DateTime::<Utc>::from_timestamp_millis(parsed.event_time),
            checksum: None,
        };

        self.stats.record_decoded();
        debug!(
            key = %update.key,
            first = update.first_update_id,
            last = update.last_update_id,
            "depth update decoded"
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
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn decode(decoder: &BinanceDecoder, value: serde_json::Value) -> FeedResult<Option<IncrementalUpdate>> {
        decoder.decode(&value.to_string())
    }

    #[test]
    fn test_decode_depth_update() {
        let decoder = BinanceDecoder::new();
        let result = decode(
            &decoder,
            json!({
                "e": "depthUpdate",
                "E": 1672515782136i64,
                "s": "BTCUSDT",
                "U": 157,
                "u": 160,
                "b": [["100.00", "1.5"], ["99.00", "0"]],
                "a": [["101.00", "2.0"]]
            }),
        )
        .unwrap()
        .unwrap();

        assert_eq!(result.key.to_string(), "binance:BTCUSDT");
        assert_eq!(result.first_update_id, 157);
        assert_eq!(result.last_update_id, 160);
        assert_eq!(result.bids.len(), 2);
        assert!(result.bids[1].is_removal());
        assert_eq!(result.asks[0].qty, Size::new(dec!(2.0)));
        assert!(result.checksum.is_none());
        assert_eq!(decoder.stats().decoded(), 1);
    }

    #[test]
    fn test_subscription_ack_ignored() {
        let decoder = BinanceDecoder::new();
        let result = decode(&decoder, json!({"result": null, "id": 1})).unwrap();
        assert!(result.is_none());
        assert_eq!(decoder.stats().ignored(), 1);
        assert_eq!(decoder.stats().failed(), 0);
    }

    #[test]
    fn test_other_event_ignored() {
        let decoder = BinanceDecoder::new();
        let result = decode(
            &decoder,
            json!({"e": "aggTrade", "E": 1672515782136i64, "s": "BTCUSDT"}),
        )
        .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_malformed_level_rejected() {
        let decoder = BinanceDecoder::new();
        let result = decode(
            &decoder,
            json!({
                "e": "depthUpdate",
                "E": 1672515782136i64,
                "s": "BTCUSDT",
                "U": 157,
                "u": 160,
                "b": [["not-a-number", "1.5"]],
                "a": []
            }),
        );
        assert!(matches!(result, Err(FeedError::InvalidLevel(_))));
        assert_eq!(decoder.stats().failed(), 1);
    }

    #[test]
    fn test_inverted_range_rejected() {
        let decoder = BinanceDecoder::new();
        let result = decode(
            &decoder,
            json!({
                "e": "depthUpdate",
                "E": 1672515782136i64,
                "s": "BTCUSDT",
                "U": 161,
                "u": 160,
                "b": [],
                "a": []
            }),
        );
        assert!(matches!(result, Err(FeedError::Malformed(_))));
    }

    #[test]
    fn test_not_json_rejected() {
        let decoder = BinanceDecoder::new();
        assert!(decoder.decode("not json").is_err());
        assert_eq!(decoder.stats().failed(), 1);
    }
}
