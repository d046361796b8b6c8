// =============================================================================
// Bitfinex candle adapter
// =============================================================================
//
// Data frames on the v2 candle channel look like
//   [CHANNEL_ID, [MTS, OPEN, CLOSE, HIGH, LOW, VOLUME]]
// Everything else (subscription acks, `[CHANNEL_ID, "hb"]` heartbeats,
// `[CHANNEL_ID, [[..], [..]]]` snapshots) is not a single candle and is skipped.
// =============================================================================

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{parse_json, SourceAdapter};
use crate::error::ParseError;
use crate::types::Candle;

/// Build the subscribe request sent on every (re)connect.
pub fn subscribe_message(channel: &str, key: &str) -> String {
    serde_json::json!({
        "event": "subscribe",
        "channel": channel,
        "key": key,
    })
    .to_string()
}

/// Decodes Bitfinex candle frames into [`Candle`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct BitfinexCandleAdapter;

impl BitfinexCandleAdapter {
    /// `Ok(None)` for any frame that is not a single candle update.
    pub fn parse(&self, raw: &[u8]) -> Result<Option<Candle>, ParseError> {
        match self.decode(raw) {
            Ok(candle) => Ok(Some(candle)),
            Err(ParseError::UnexpectedShape) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl SourceAdapter for BitfinexCandleAdapter {
    type Event = Candle;

    fn decode(&self, raw: &[u8]) -> Result<Candle, ParseError> {
        let root = parse_json(raw)?;

        let fields = root
            .as_array()
            .filter(|frame| frame.len() > 1)
            .and_then(|frame| frame[1].as_array())
            .filter(|fields| fields.len() >= 6)
            .ok_or(ParseError::UnexpectedShape)?;

        let number = |i: usize| fields[i].as_f64().ok_or(ParseError::UnexpectedShape);

        Ok(Candle {
            timestamp: coerce_timestamp(&fields[0]),
            open: number(1)?,
            close: number(2)?,
            high: number(3)?,
            low: number(4)?,
            volume: number(5)?,
        })
    }
}

/// Coerce an epoch-millisecond value, falling back to
/// [`Candle::INVALID_TIMESTAMP`] instead of rejecting the candle.
fn coerce_timestamp(val: &Value) -> i64 {
    let ms = match val {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(float_to_ms)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(float_to_ms))
        }
        _ => None,
    };

    ms.filter(|&ms| DateTime::<Utc>::from_timestamp_millis(ms).is_some())
        .unwrap_or(Candle::INVALID_TIMESTAMP)
}

fn float_to_ms(v: f64) -> Option<i64> {
    if v.is_finite() && v.abs() < i64::MAX as f64 {
        Some(v.trunc() as i64)
    } else {
        None
    }
}
