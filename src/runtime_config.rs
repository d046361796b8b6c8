// =============================================================================
// Runtime Configuration — feed endpoints and indicator settings
// =============================================================================
//
// Loaded once at startup from a JSON file. All fields carry serde defaults so
// a partial file (or `{}`) is enough to run against the public endpoints.
//
// =============================================================================

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::indicators::rsi::DEFAULT_RSI_PERIOD;
use crate::indicators::vwap::VwapAnchor;
use crate::market_data::binance::kline_stream_url;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_binance_ws_base_url() -> String {
    "wss://stream.binance.com:9443/ws".to_string()
}

fn default_binance_symbol() -> String {
    "BTCUSDT".to_string()
}

fn default_binance_interval() -> String {
    "5m".to_string()
}

fn default_rsi_period() -> usize {
    DEFAULT_RSI_PERIOD
}

fn default_bitfinex_ws_url() -> String {
    "wss://api-pub.bitfinex.com/ws/2".to_string()
}

fn default_bitfinex_channel() -> String {
    "candles".to_string()
}

fn default_bitfinex_key() -> String {
    "trade:1m:tBTCUSD".to_string()
}

fn default_reconnect_delay_secs() -> u64 {
    5
}

// =============================================================================
// Per-source sections
// =============================================================================

/// Binance kline stream feeding the RSI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinanceConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_binance_ws_base_url")]
    pub ws_base_url: String,

    #[serde(default = "default_binance_symbol")]
    pub symbol: String,

    /// Kline interval, e.g. `1m`, `5m`, `1h`.
    #[serde(default = "default_binance_interval")]
    pub interval: String,

    /// RSI window length in closes.
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,
}

impl Default for BinanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ws_base_url: default_binance_ws_base_url(),
            symbol: default_binance_symbol(),
            interval: default_binance_interval(),
            rsi_period: default_rsi_period(),
        }
    }
}

impl BinanceConfig {
    pub fn stream_url(&self) -> String {
        kline_stream_url(&self.ws_base_url, &self.symbol, &self.interval)
    }
}

/// Bitfinex candle channel feeding the VWAP.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitfinexConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_bitfinex_ws_url")]
    pub ws_url: String,

    #[serde(default = "default_bitfinex_channel")]
    pub channel: String,

    /// Candle key, `trade:{timeframe}:{symbol}`.
    #[serde(default = "default_bitfinex_key")]
    pub key: String,

    #[serde(default)]
    pub vwap_anchor: VwapAnchor,
}

impl Default for BitfinexConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ws_url: default_bitfinex_ws_url(),
            channel: default_bitfinex_channel(),
            key: default_bitfinex_key(),
            vwap_anchor: VwapAnchor::default(),
        }
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level configuration for the feed engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default)]
    pub binance: BinanceConfig,

    #[serde(default)]
    pub bitfinex: BitfinexConfig,

    /// Pause between a dropped connection and the next attempt.
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,

    /// Consecutive failed sessions before a source gives up (0 = never).
    #[serde(default)]
    pub max_reconnect_attempts: u32,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            binance: BinanceConfig::default(),
            bitfinex: BitfinexConfig::default(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
            max_reconnect_attempts: 0,
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            binance_symbol = %config.binance.symbol,
            bitfinex_key = %config.bitfinex.key,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Apply `PULSE_BINANCE_SYMBOL` / `PULSE_BITFINEX_KEY` style overrides.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(symbol) = lookup("PULSE_BINANCE_SYMBOL").map(|s| s.trim().to_uppercase()) {
            if !symbol.is_empty() {
                self.binance.symbol = symbol;
            }
        }
        if let Some(key) = lookup("PULSE_BITFINEX_KEY").map(|s| s.trim().to_string()) {
            if !key.is_empty() {
                self.bitfinex.key = key;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.binance.enabled && !self.bitfinex.enabled {
            bail!("both sources are disabled, nothing to stream");
        }
        if self.binance.enabled && self.binance.rsi_period == 0 {
            bail!("binance.rsi_period must be at least 1");
        }
        Ok(())
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }
}
