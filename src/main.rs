// =============================================================================
// Pulse Feed — Main Entry Point
// =============================================================================
//
// Streams Binance klines and Bitfinex candles side by side and logs a rolling
// RSI and a cumulative VWAP as the data arrives. Each source runs in its own
// task; Ctrl+C stops both.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use pulse_feed::dispatcher::Dispatcher;
use pulse_feed::processor::{RsiProcessor, VwapProcessor};
use pulse_feed::runtime_config::RuntimeConfig;
use pulse_feed::sink::LogSink;
use pulse_feed::transport::{Transport, WsTransport};
use pulse_feed::types::Source;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Pulse feed starting up");

    let config_path =
        std::env::var("PULSE_CONFIG").unwrap_or_else(|_| "pulse_config.json".into());
    let mut config = RuntimeConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });
    config.apply_overrides(|name| std::env::var(name).ok());
    config.validate()?;

    // ── 2. Processors & transports ───────────────────────────────────────
    let sink = Arc::new(LogSink::new());
    let mut dispatcher = Dispatcher::new();
    let mut transports: HashMap<Source, Arc<dyn Transport>> = HashMap::new();

    if config.binance.enabled {
        let url = config.binance.stream_url();
        info!(
            url = %url,
            rsi_period = config.binance.rsi_period,
            "Binance kline stream configured"
        );
        dispatcher.register(Box::new(RsiProcessor::new(
            config.binance.rsi_period,
            sink.clone(),
        )))?;
        transports.insert(
            Source::Binance,
            Arc::new(WsTransport::new(
                url,
                config.reconnect_delay(),
                config.max_reconnect_attempts,
            )),
        );
    }

    if config.bitfinex.enabled {
        info!(
            url = %config.bitfinex.ws_url,
            key = %config.bitfinex.key,
            anchor = ?config.bitfinex.vwap_anchor,
            "Bitfinex candle stream configured"
        );
        dispatcher.register(Box::new(VwapProcessor::new(
            &config.bitfinex.channel,
            &config.bitfinex.key,
            config.bitfinex.vwap_anchor,
            sink.clone(),
        )))?;
        transports.insert(
            Source::Bitfinex,
            Arc::new(WsTransport::new(
                config.bitfinex.ws_url.clone(),
                config.reconnect_delay(),
                config.max_reconnect_attempts,
            )),
        );
    }

    // ── 3. Run until both streams end or Ctrl+C ──────────────────────────
    info!("All streams running. Press Ctrl+C to stop.");
    let report = dispatcher
        .run_until(transports, tokio::signal::ctrl_c())
        .await?;

    // ── 4. Final report ──────────────────────────────────────────────────
    for (source, stats) in &report {
        info!(source = %source, stats = ?stats, "final stream stats");
    }
    for last in sink.snapshot() {
        info!(
            source = %last.source,
            indicator = %last.indicator,
            close = last.price,
            value = last.value,
            "last indicator value"
        );
    }

    info!("Pulse feed shut down complete.");
    Ok(())
}
