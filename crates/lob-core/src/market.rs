//! Book identification types.
//!
//! Every subscribed order book is identified by an exchange plus an
//! exchange-native symbol. This module provides the types that key all
//! per-book state in the system.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported exchange, grouped by depth-feed sequencing protocol.
///
/// `Binance` streams carry an explicit (first, last) update-id range per
/// message. `Okx` streams carry a single sequence id plus a pointer to the
/// previous message's id, and a book checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeId {
    Binance,
    Okx,
}

impl ExchangeId {
    /// All supported exchanges.
    pub const ALL: &'static [Self] = &[Self::Binance, Self::Okx];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Binance => "binance",
            Self::Okx => "okx",
        }
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExchangeId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "binance" => Ok(Self::Binance),
            "okx" => Ok(Self::Okx),
            other => Err(CoreError::UnknownExchange(other.to_string())),
        }
    }
}

/// Exchange-native instrument identifier (e.g., "BTCUSDT", "BTC-USDT").
///
/// Stored verbatim; no normalization across venues is attempted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Unique book identifier combining exchange and symbol.
///
/// This is the primary key for per-book state. Format: `{exchange}:{symbol}`
/// (e.g., "binance:BTCUSDT").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookKey {
    pub exchange: ExchangeId,
    pub symbol: Symbol,
}

impl BookKey {
    pub fn new(exchange: ExchangeId, symbol: impl Into<Symbol>) -> Self {
        Self {
            exchange,
            symbol: symbol.into(),
        }
    }
}

impl fmt::Display for BookKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.exchange, self.symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exchange_roundtrip() {
        for ex in ExchangeId::ALL {
            let parsed: ExchangeId = ex.as_str().parse().unwrap();
            assert_eq!(parsed, *ex);
        }
        assert!("kraken".parse::<ExchangeId>().is_err());
    }

    #[test]
    fn test_book_key_display() {
        let key = BookKey::new(ExchangeId::Binance, "BTCUSDT");
        assert_eq!(key.to_string(), "binance:BTCUSDT");
    }

    #[test]
    fn test_symbol_verbatim() {
        let s = Symbol::new("BTC-USDT");
        assert_eq!(s.as_str(), "BTC-USDT");
    }
}
