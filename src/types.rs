// =============================================================================
// Shared types used across the Pulse feed engine
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Exchange a stream originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Binance,
    Bitfinex,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Binance => write!(f, "binance"),
            Self::Bitfinex => write!(f, "bitfinex"),
        }
    }
}

/// Indicator attached to an emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndicatorKind {
    Rsi,
    Vwap,
}

impl std::fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rsi => write!(f, "RSI"),
            Self::Vwap => write!(f, "VWAP"),
        }
    }
}

/// One kline sample from the Binance stream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizedTick {
    pub close_price: f64,
    /// The exchange considers the interval final.
    pub is_window_closed: bool,
}

/// A single OHLCV candle from the Bitfinex candle channel.
///
/// Field order matches the wire order `[MTS, OPEN, CLOSE, HIGH, LOW, VOLUME]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Millisecond epoch, or [`Candle::INVALID_TIMESTAMP`] when the feed sent
    /// something that could not be coerced.
    pub timestamp: i64,
    pub open: f64,
    pub close: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
}

impl Candle {
    pub const INVALID_TIMESTAMP: i64 = i64::MIN;

    pub fn has_valid_timestamp(&self) -> bool {
        self.timestamp != Self::INVALID_TIMESTAMP
    }

    /// Candle open time in UTC, `None` for the invalid sentinel or an
    /// out-of-range epoch.
    pub fn open_time(&self) -> Option<DateTime<Utc>> {
        if !self.has_valid_timestamp() {
            return None;
        }
        DateTime::<Utc>::from_timestamp_millis(self.timestamp)
    }

    /// `(high + low + close) / 3`, the price input used by VWAP.
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

/// An indicator value handed to the emission sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Emission {
    pub source: Source,
    /// Latest close price the value was computed with.
    pub price: f64,
    pub indicator: IndicatorKind,
    pub value: f64,
}
