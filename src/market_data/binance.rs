// =============================================================================
// Binance kline adapter
// =============================================================================

use serde_json::Value;

use super::{parse_json, SourceAdapter};
use crate::error::ParseError;
use crate::types::NormalizedTick;

/// Build the single-stream kline URL, e.g.
/// `wss://stream.binance.com:9443/ws/btcusdt@kline_5m`.
pub fn kline_stream_url(base_url: &str, symbol: &str, interval: &str) -> String {
    let lower = symbol.to_lowercase();
    format!("{}/{lower}@kline_{interval}", base_url.trim_end_matches('/'))
}

/// Decodes Binance kline events into [`NormalizedTick`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct BinanceKlineAdapter;

impl BinanceKlineAdapter {
    /// Parse a kline message.
    ///
    /// Expected shape (single stream, or wrapped in a combined-stream
    /// `{"stream": .., "data": {..}}` envelope):
    /// ```json
    /// { "e": "kline", "s": "BTCUSDT", "k": { "c": "37020.00", "x": false, ... } }
    /// ```
    pub fn parse(&self, raw: &[u8]) -> Result<NormalizedTick, ParseError> {
        let root = parse_json(raw)?;

        let data = root.get("data").unwrap_or(&root);

        let k = data.get("k").ok_or(ParseError::MissingField("k"))?;
        if !k.is_object() {
            return Err(ParseError::malformed("k", "expected an object"));
        }

        let close_price = parse_price(k.get("c").ok_or(ParseError::MissingField("k.c"))?, "k.c")?;
        let is_window_closed = k
            .get("x")
            .ok_or(ParseError::MissingField("k.x"))?
            .as_bool()
            .ok_or_else(|| ParseError::malformed("k.x", "expected a boolean"))?;

        Ok(NormalizedTick {
            close_price,
            is_window_closed,
        })
    }
}

impl SourceAdapter for BinanceKlineAdapter {
    type Event = NormalizedTick;

    fn decode(&self, raw: &[u8]) -> Result<NormalizedTick, ParseError> {
        self.parse(raw)
    }
}

/// Binance sends prices as JSON strings inside kline objects; plain numbers
/// are accepted as well.
fn parse_price(val: &Value, field: &'static str) -> Result<f64, ParseError> {
    let price = match val {
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| ParseError::malformed(field, format!("{s:?}: {e}")))?,
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| ParseError::malformed(field, "not representable as f64"))?,
        _ => return Err(ParseError::malformed(field, "unexpected JSON type")),
    };

    if price.is_finite() {
        Ok(price)
    } else {
        Err(ParseError::malformed(field, "not finite"))
    }
}
