//! Application configuration.

use crate::error::{AppError, AppResult};
use lob_core::ExchangeId;
use lob_engine::SyncConfig;
use lob_rest::RestConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One subscribed book.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    /// Exchange the symbol trades on.
    pub exchange: ExchangeId,
    /// Exchange-native symbol (e.g., "BTCUSDT", "BTC-USDT").
    pub symbol: String,
}

/// Engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSection {
    /// Pending-update buffer capacity per book.
    #[serde(default = "default_buffer_capacity")]
    pub buffer_capacity: usize,
    /// Depth requested per snapshot.
    #[serde(default = "default_snapshot_depth")]
    pub snapshot_depth: usize,
    /// Consecutive resync failures before a book enters ERROR.
    #[serde(default = "default_max_resync_failures")]
    pub max_resync_failures: u32,
    /// Window over which resync failures are counted (seconds).
    #[serde(default = "default_failure_window_secs")]
    pub failure_window_secs: u64,
    /// Delay before retrying a failed snapshot fetch (ms).
    #[serde(default = "default_resync_delay_ms")]
    pub resync_delay_ms: u64,
    /// Interval of the periodic snapshot audit (seconds).
    #[serde(default = "default_audit_interval_secs")]
    pub audit_interval_secs: u64,
}

fn default_buffer_capacity() -> usize {
    1000
}
fn default_snapshot_depth() -> usize {
    400
}
fn default_max_resync_failures() -> u32 {
    5
}
fn default_failure_window_secs() -> u64 {
    60
}
fn default_resync_delay_ms() -> u64 {
    500
}
fn default_audit_interval_secs() -> u64 {
    300
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            buffer_capacity: default_buffer_capacity(),
            snapshot_depth: default_snapshot_depth(),
            max_resync_failures: default_max_resync_failures(),
            failure_window_secs: default_failure_window_secs(),
            resync_delay_ms: default_resync_delay_ms(),
            audit_interval_secs: default_audit_interval_secs(),
        }
    }
}

impl EngineSection {
    pub fn to_sync_config(&self) -> SyncConfig {
        SyncConfig {
            buffer_capacity: self.buffer_capacity,
            snapshot_depth: self.snapshot_depth,
            max_resync_failures: self.max_resync_failures,
            failure_window: Duration::from_secs(self.failure_window_secs),
            resync_delay: Duration::from_millis(self.resync_delay_ms),
            audit_interval: Duration::from_secs(self.audit_interval_secs),
        }
    }
}

/// Snapshot REST endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestSection {
    #[serde(default = "default_binance_url")]
    pub binance_url: String,
    #[serde(default = "default_okx_url")]
    pub okx_url: String,
    #[serde(default = "default_rest_timeout_ms")]
    pub timeout_ms: u64,
    /// Snapshots are never requested shallower than this.
    #[serde(default = "default_min_depth")]
    pub min_depth: usize,
}

fn default_binance_url() -> String {
    "https://api.binance.com".to_string()
}
fn default_okx_url() -> String {
    "https://www.okx.com".to_string()
}
fn default_rest_timeout_ms() -> u64 {
    10_000
}
fn default_min_depth() -> usize {
    100
}

impl Default for RestSection {
    fn default() -> Self {
        Self {
            binance_url: default_binance_url(),
            okx_url: default_okx_url(),
            timeout_ms: default_rest_timeout_ms(),
            min_depth: default_min_depth(),
        }
    }
}

impl RestSection {
    pub fn to_rest_config(&self) -> RestConfig {
        RestConfig {
            binance_url: self.binance_url.clone(),
            okx_url: self.okx_url.clone(),
            timeout_ms: self.timeout_ms,
            min_depth: self.min_depth,
        }
    }
}

/// Feed routing policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterSection {
    /// Consecutive decode failures on one exchange feed before every book
    /// on that exchange is forced to resync.
    #[serde(default = "default_decode_failure_limit")]
    pub decode_failure_limit: u32,
}

fn default_decode_failure_limit() -> u32 {
    10
}

impl Default for RouterSection {
    fn default() -> Self {
        Self {
            decode_failure_limit: default_decode_failure_limit(),
        }
    }
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineSection,
    #[serde(default)]
    pub rest: RestSection,
    #[serde(default)]
    pub router: RouterSection,
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionConfig>,
}

impl AppConfig {
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        toml::from_str(&content).map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_config() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.engine.buffer_capacity, 1000);
        assert_eq!(config.rest.min_depth, 100);
        assert_eq!(config.router.decode_failure_limit, 10);
        assert!(config.subscriptions.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let config: AppConfig = toml::from_str(
            r#"
            [engine]
            buffer_capacity = 2000
            audit_interval_secs = 120

            [rest]
            binance_url = "http://localhost:8080"

            [[subscriptions]]
            exchange = "binance"
            symbol = "BTCUSDT"

            [[subscriptions]]
            exchange = "okx"
            symbol = "BTC-USDT"
            "#,
        )
        .unwrap();

        assert_eq!(config.engine.buffer_capacity, 2000);
        // Unspecified fields keep their defaults.
        assert_eq!(config.engine.max_resync_failures, 5);
        assert_eq!(config.rest.binance_url, "http://localhost:8080");
        assert_eq!(config.subscriptions.len(), 2);
        assert_eq!(config.subscriptions[1].exchange, ExchangeId::Okx);

        let sync = config.engine.to_sync_config();
        assert_eq!(sync.audit_interval, Duration::from_secs(120));
    }
}
