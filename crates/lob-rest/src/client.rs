//! HTTP client for fetching depth snapshots.

use crate::error::{RestError, RestResult};
use chrono::Utc;
use lob_core::{BookKey, ExchangeId, OrderBookSnapshot, Price, PriceLevel, Size};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

/// Default timeout for snapshot requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Depth limits the Binance endpoint actually serves; requests are snapped
/// up to the nearest one.
const BINANCE_DEPTH_LIMITS: [usize; 8] = [5, 10, 20, 50, 100, 500, 1000, 5000];

/// Maximum depth the OKX books endpoint serves.
const OKX_MAX_DEPTH: usize = 400;

/// Anything that can produce a depth snapshot for a book.
///
/// Abstracts the HTTP client so the sync engine is testable without a
/// network.
pub trait SnapshotSource: Send + Sync + 'static {
    fn fetch_snapshot(
        &self,
        key: &BookKey,
        depth: usize,
    ) -> impl Future<Output = RestResult<OrderBookSnapshot>> + Send;
}

/// Snapshot client configuration.
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Binance REST base URL.
    pub binance_url: String,
    /// OKX REST base URL.
    pub okx_url: String,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Snapshots are never requested shallower than this.
    pub min_depth: usize,
}

impl Default for RestConfig {
    fn default() -> Self {
        Self {
            binance_url: "https://api.binance.com".to_string(),
            okx_url: "https://www.okx.com".to_string(),
            timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
            min_depth: 100,
        }
    }
}

/// Raw Binance depth response.
#[derive(Debug, Deserialize)]
struct RawBinanceDepth {
    #[serde(rename = "lastUpdateId")]
    last_update_id: u64,
    bids: Vec<[String; 2]>,
    asks: Vec<[String; 2]>,
}

/// Raw OKX books response envelope.
#[derive(Debug, Deserialize)]
struct RawOkxBooks {
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Vec<RawOkxBooksData>,
}

#[derive(Debug, Deserialize)]
struct RawOkxBooksData {
    bids: Vec<Vec<String>>,
    asks: Vec<Vec<String>>,
    #[serde(rename = "seqId")]
    seq_id: u64,
}

/// REST client for depth snapshots.
pub struct SnapshotClient {
    http: Client,
    config: RestConfig,
}

impl SnapshotClient {
    /// Create a new snapshot client.
    pub fn new(config: RestConfig) -> RestResult<Self> {
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| RestError::Network(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    /// Effective depth for a request: at least the configured minimum,
    /// snapped to what the venue serves.
    fn effective_depth(&self, exchange: ExchangeId, depth: usize) -> usize {
        let depth = depth.max(self.config.min_depth);
        match exchange {
            ExchangeId::Binance => BINANCE_DEPTH_LIMITS
                .iter()
                .copied()
                .find(|&l| l >= depth)
                .unwrap_or(5000),
            ExchangeId::Okx => depth.min(OKX_MAX_DEPTH),
        }
    }

    fn snapshot_url(&self, key: &BookKey, depth: usize) -> String {
        match key.exchange {
            ExchangeId::Binance => format!(
                "{}/api/v3/depth?symbol={}&limit={depth}",
                self.config.binance_url, key.symbol
            ),
            ExchangeId::Okx => format!(
                "{}/api/v5/market/books?instId={}&sz={depth}",
                self.config.okx_url, key.symbol
            ),
        }
    }

    async fn fetch(&self, key: &BookKey, depth: usize) -> RestResult<OrderBookSnapshot> {
        let depth = self.effective_depth(key.exchange, depth);
        let url = self.snapshot_url(key, depth);
        info!(key = %key, depth, "fetching depth snapshot");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| RestError::Network(format!("request failed: {e}")))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
            return Err(RestError::RateLimited(format!("HTTP {status}")));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RestError::Network(format!("HTTP {status}: {body}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| RestError::Network(format!("body read failed: {e}")))?;

        let snapshot = match key.exchange {
            ExchangeId::Binance => parse_binance_depth(key.clone(), &body)?,
            ExchangeId::Okx => parse_okx_books(key.clone(), &body)?,
        };

        debug!(
            key = %key,
            sequence = snapshot.sequence,
            bids = snapshot.bids.len(),
            asks = snapshot.asks.len(),
            "snapshot fetched"
        );
        Ok(snapshot)
    }
}

impl SnapshotSource for SnapshotClient {
    fn fetch_snapshot(
        &self,
        key: &BookKey,
        depth: usize,
    ) -> impl Future<Output = RestResult<OrderBookSnapshot>> + Send {
        self.fetch(key, depth)
    }
}

fn parse_level_pair(px: &str, qty: &str) -> RestResult<PriceLevel> {
    let price: Price = px
        .parse()
        .map_err(|_| RestError::Malformed(format!("price {px:?}")))?;
    let qty: Size = qty
        .parse()
        .map_err(|_| RestError::Malformed(format!("qty {qty:?}")))?;
    Ok(PriceLevel::new(price, qty))
}

/// Sort sides canonically: bids descending, asks ascending.
fn sort_sides(bids: &mut [PriceLevel], asks: &mut [PriceLevel]) {
    bids.sort_by(|a, b| b.price.cmp(&a.price));
    asks.sort_by(|a, b| a.price.cmp(&b.price));
}

fn parse_binance_depth(key: BookKey, body: &str) -> RestResult<OrderBookSnapshot> {
    let raw: RawBinanceDepth = serde_json::from_str(body)
        .map_err(|e| RestError::Malformed(format!("binance depth: {e}")))?;

    let mut bids = raw
        .bids
        .iter()
        .map(|pair| parse_level_pair(&pair[0], &pair[1]))
        .collect::<RestResult<Vec<_>>>()?;
    let mut asks = raw
        .asks
        .iter()
        .map(|pair| parse_level_pair(&pair[0], &pair[1]))
        .collect::<RestResult<Vec<_>>>()?;
    sort_sides(&mut bids, &mut asks);

    Ok(OrderBookSnapshot {
        key,
        sequence: raw.last_update_id,
        bids,
        asks,
        captured_at: Utc::now(),
    })
}

fn parse_okx_books(key: BookKey, body: &str) -> RestResult<OrderBookSnapshot> {
    let raw: RawOkxBooks =
        serde_json::from_str(body).map_err(|e| RestError::Malformed(format!("okx books: {e}")))?;

    if raw.code != "0" {
        // 50011 is OKX's request-rate code.
        if raw.code == "50011" {
            return Err(RestError::RateLimited(format!("code {}: {}", raw.code, raw.msg)));
        }
        return Err(RestError::Malformed(format!(
            "code {}: {}",
            raw.code, raw.msg
        )));
    }

    let data = raw
        .data
        .first()
        .ok_or_else(|| RestError::Malformed("okx books: empty data".into()))?;

    let parse_side = |levels: &[Vec<String>]| -> RestResult<Vec<PriceLevel>> {
        levels
            .iter()
            .map(|entry| {
                if entry.len() < 2 {
                    return Err(RestError::Malformed(format!("level {entry:?}")));
                }
                parse_level_pair(&entry[0], &entry[1])
            })
            .collect()
    };

    let mut bids = parse_side(&data.bids)?;
    let mut asks = parse_side(&data.asks)?;
    sort_sides(&mut bids, &mut asks);

    Ok(OrderBookSnapshot {
        key,
        sequence: data.seq_id,
        bids,
        asks,
        captured_at: Utc::now(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn binance_key() -> BookKey {
        BookKey::new(ExchangeId::Binance, "BTCUSDT")
    }

    fn okx_key() -> BookKey {
        BookKey::new(ExchangeId::Okx, "BTC-USDT")
    }

    #[test]
    fn test_parse_binance_depth() {
        // Levels deliberately out of order: the fetcher sorts.
        let body = r#"{
            "lastUpdateId": 1027024,
            "bids": [["99.00", "2.0"], ["100.00", "1.0"]],
            "asks": [["102.00", "3.0"], ["101.00", "1.0"]]
        }"#;

        let snap = parse_binance_depth(binance_key(), body).unwrap();
        assert_eq!(snap.sequence, 1027024);
        assert_eq!(snap.best_bid().unwrap(), Price::new(dec!(100)));
        assert_eq!(snap.best_ask().unwrap(), Price::new(dec!(101)));
        assert!(!snap.is_crossed());
    }

    #[test]
    fn test_parse_binance_malformed() {
        let result = parse_binance_depth(binance_key(), r#"{"bids": []}"#);
        assert!(matches!(result, Err(RestError::Malformed(_))));
    }

    #[test]
    fn test_parse_okx_books() {
        let body = r#"{
            "code": "0",
            "msg": "",
            "data": [{
                "bids": [["100.0", "1.5", "0", "3"]],
                "asks": [["101.0", "2.0", "0", "1"]],
                "ts": "1597026383085",
                "seqId": 123456
            }]
        }"#;

        let snap = parse_okx_books(okx_key(), body).unwrap();
        assert_eq!(snap.sequence, 123456);
        assert_eq!(snap.bids[0].qty, Size::new(dec!(1.5)));
    }

    #[test]
    fn test_parse_okx_error_code() {
        let body = r#"{"code": "51001", "msg": "Instrument ID does not exist", "data": []}"#;
        assert!(matches!(
            parse_okx_books(okx_key(), body),
            Err(RestError::Malformed(_))
        ));

        let body = r#"{"code": "50011", "msg": "Requests too frequent", "data": []}"#;
        assert!(matches!(
            parse_okx_books(okx_key(), body),
            Err(RestError::RateLimited(_))
        ));
    }

    #[test]
    fn test_effective_depth() {
        let client = SnapshotClient::new(RestConfig {
            min_depth: 100,
            ..RestConfig::default()
        })
        .unwrap();

        // Clamped up to the configured minimum, then snapped to the venue.
        assert_eq!(client.effective_depth(ExchangeId::Binance, 10), 100);
        assert_eq!(client.effective_depth(ExchangeId::Binance, 101), 500);
        assert_eq!(client.effective_depth(ExchangeId::Binance, 9999), 5000);
        assert_eq!(client.effective_depth(ExchangeId::Okx, 10), 100);
        assert_eq!(client.effective_depth(ExchangeId::Okx, 999), OKX_MAX_DEPTH);
    }

    #[test]
    fn test_snapshot_urls() {
        let client = SnapshotClient::new(RestConfig::default()).unwrap();
        assert_eq!(
            client.snapshot_url(&binance_key(), 100),
            "https://api.binance.com/api/v3/depth?symbol=BTCUSDT&limit=100"
        );
        assert_eq!(
            client.snapshot_url(&okx_key(), 400),
            "https://www.okx.com/api/v5/market/books?instId=BTC-USDT&sz=400"
        );
    }
}
