// =============================================================================
// Stream Processors — one adapter + one indicator per source
// =============================================================================
//
// A processor receives the transport callbacks for a single connection, turns
// each frame into a market event and feeds its indicator. Values go to the
// injected sink once the indicator has enough history:
//
//   Filling ──(minimum history reached)──> Active
//      ^                                     |
//      └──────── on_open ── Closed <── on_close
//
// Indicator state survives reconnects; only a process restart clears it.
// Processors are driven by exactly one task, so no locking is needed.
// =============================================================================

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::{ConnectionError, ParseError};
use crate::indicators::rsi::RollingWindowRsi;
use crate::indicators::vwap::{CumulativeVwap, VwapAnchor};
use crate::market_data::bitfinex::subscribe_message;
use crate::market_data::{BinanceKlineAdapter, BitfinexCandleAdapter, SourceAdapter};
use crate::sink::EmissionSink;
use crate::transport::TransportEvent;
use crate::types::{Candle, Emission, IndicatorKind, NormalizedTick, Source};

/// Lifecycle phase of a processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StreamState {
    /// Connected, not enough history to emit yet.
    Filling,
    /// Connected and emitting.
    Active,
    /// Not connected. Incoming messages are dropped.
    Closed,
}

/// Per-processor counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessorStats {
    pub messages: u64,
    pub emitted: u64,
    /// Non-data frames (acks, heartbeats, snapshots).
    pub skipped: u64,
    pub parse_errors: u64,
    pub connection_errors: u64,
    /// Messages that arrived while closed.
    pub dropped: u64,
}

/// Callback surface a transport drives for one source.
pub trait StreamProcessor: Send {
    fn source(&self) -> Source;

    fn state(&self) -> StreamState;

    fn stats(&self) -> ProcessorStats;

    /// Connection established. Returns a payload the transport must send
    /// verbatim, if the source needs a subscription.
    fn on_open(&mut self) -> Option<String>;

    /// One raw frame, in arrival order.
    fn on_message(&mut self, raw: &[u8]) -> Option<Emission>;

    fn on_error(&mut self, err: &ConnectionError);

    fn on_close(&mut self);

    /// Route a transport event to the matching callback.
    fn handle_event(&mut self, event: TransportEvent) -> Option<String> {
        match event {
            TransportEvent::Open => return self.on_open(),
            TransportEvent::Message(raw) => {
                self.on_message(&raw);
            }
            TransportEvent::Error(err) => self.on_error(&err),
            TransportEvent::Close => self.on_close(),
        }
        None
    }
}

// =============================================================================
// Shared lifecycle bookkeeping
// =============================================================================

#[derive(Debug)]
struct Lifecycle {
    source: Source,
    open: bool,
    stats: ProcessorStats,
}

impl Lifecycle {
    fn new(source: Source) -> Self {
        Self {
            source,
            open: false,
            stats: ProcessorStats::default(),
        }
    }

    fn open(&mut self) {
        self.open = true;
        info!(source = %self.source, "stream opened");
    }

    /// Count an inbound message; `false` when it must be dropped.
    fn admit(&mut self) -> bool {
        if !self.open {
            self.stats.dropped += 1;
            debug!(source = %self.source, "message while closed, dropped");
            return false;
        }
        self.stats.messages += 1;
        true
    }

    fn parse_failed(&mut self, err: &ParseError) {
        if *err == ParseError::UnexpectedShape {
            self.stats.skipped += 1;
            debug!(source = %self.source, "non-data frame skipped");
        } else {
            self.stats.parse_errors += 1;
            warn!(source = %self.source, error = %err, "failed to parse message");
        }
    }

    fn connection_error(&mut self, err: &ConnectionError) {
        self.stats.connection_errors += 1;
        error!(source = %self.source, error = %err, "connection error");
    }

    fn close(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        info!(
            source = %self.source,
            messages = self.stats.messages,
            emitted = self.stats.emitted,
            skipped = self.stats.skipped,
            parse_errors = self.stats.parse_errors,
            "stream closed"
        );
    }

    fn state(&self, ready: bool) -> StreamState {
        match (self.open, ready) {
            (false, _) => StreamState::Closed,
            (true, false) => StreamState::Filling,
            (true, true) => StreamState::Active,
        }
    }

    fn emit(&mut self, sink: &dyn EmissionSink, emission: Emission) -> Option<Emission> {
        self.stats.emitted += 1;
        sink.emit(&emission);
        Some(emission)
    }
}

// =============================================================================
// Binance kline -> RSI
// =============================================================================

/// Feeds every kline close into a rolling RSI window and emits on closed
/// intervals once the window is full.
pub struct RsiProcessor {
    adapter: BinanceKlineAdapter,
    rsi: RollingWindowRsi,
    sink: Arc<dyn EmissionSink>,
    life: Lifecycle,
}

impl RsiProcessor {
    pub fn new(period: usize, sink: Arc<dyn EmissionSink>) -> Self {
        Self {
            adapter: BinanceKlineAdapter,
            rsi: RollingWindowRsi::new(period),
            sink,
            life: Lifecycle::new(Source::Binance),
        }
    }

    pub fn rsi(&self) -> &RollingWindowRsi {
        &self.rsi
    }

    fn on_tick(&mut self, tick: NormalizedTick) -> Option<Emission> {
        // Open-interval ticks still move the window.
        self.rsi.push(tick.close_price);
        if !tick.is_window_closed {
            return None;
        }
        let value = self.rsi.value()?;
        let emission = Emission {
            source: Source::Binance,
            price: tick.close_price,
            indicator: IndicatorKind::Rsi,
            value,
        };
        self.life.emit(self.sink.as_ref(), emission)
    }
}

impl StreamProcessor for RsiProcessor {
    fn source(&self) -> Source {
        Source::Binance
    }

    fn state(&self) -> StreamState {
        self.life.state(self.rsi.is_full())
    }

    fn stats(&self) -> ProcessorStats {
        self.life.stats
    }

    fn on_open(&mut self) -> Option<String> {
        self.life.open();
        None
    }

    fn on_message(&mut self, raw: &[u8]) -> Option<Emission> {
        if !self.life.admit() {
            return None;
        }
        match self.adapter.decode(raw) {
            Ok(tick) => self.on_tick(tick),
            Err(e) => {
                self.life.parse_failed(&e);
                None
            }
        }
    }

    fn on_error(&mut self, err: &ConnectionError) {
        self.life.connection_error(err);
    }

    fn on_close(&mut self) {
        self.life.close();
    }
}

// =============================================================================
// Bitfinex candles -> VWAP
// =============================================================================

/// Subscribes to a candle channel and emits the cumulative VWAP after every
/// candle.
pub struct VwapProcessor {
    adapter: BitfinexCandleAdapter,
    vwap: CumulativeVwap,
    subscription: String,
    sink: Arc<dyn EmissionSink>,
    life: Lifecycle,
}

impl VwapProcessor {
    pub fn new(channel: &str, key: &str, anchor: VwapAnchor, sink: Arc<dyn EmissionSink>) -> Self {
        Self {
            adapter: BitfinexCandleAdapter,
            vwap: CumulativeVwap::new(anchor),
            subscription: subscribe_message(channel, key),
            sink,
            life: Lifecycle::new(Source::Bitfinex),
        }
    }

    pub fn vwap(&self) -> &CumulativeVwap {
        &self.vwap
    }

    fn on_candle(&mut self, candle: Candle) -> Option<Emission> {
        let value = self.vwap.update(&candle);
        if value.is_nan() {
            warn!(source = %Source::Bitfinex, "cumulative volume is zero, VWAP undefined");
        }
        if !candle.has_valid_timestamp() {
            debug!(source = %Source::Bitfinex, "candle with invalid timestamp");
        }
        let emission = Emission {
            source: Source::Bitfinex,
            price: candle.close,
            indicator: IndicatorKind::Vwap,
            value,
        };
        self.life.emit(self.sink.as_ref(), emission)
    }
}

impl StreamProcessor for VwapProcessor {
    fn source(&self) -> Source {
        Source::Bitfinex
    }

    fn state(&self) -> StreamState {
        self.life.state(!self.vwap.is_empty())
    }

    fn stats(&self) -> ProcessorStats {
        self.life.stats
    }

    fn on_open(&mut self) -> Option<String> {
        self.life.open();
        Some(self.subscription.clone())
    }

    fn on_message(&mut self, raw: &[u8]) -> Option<Emission> {
        if !self.life.admit() {
            return None;
        }
        match self.adapter.decode(raw) {
            Ok(candle) => self.on_candle(candle),
            Err(e) => {
                self.life.parse_failed(&e);
                None
            }
        }
    }

    fn on_error(&mut self, err: &ConnectionError) {
        self.life.connection_error(err);
    }

    fn on_close(&mut self) {
        self.life.close();
    }
}
