pub mod binance;
pub mod bitfinex;

pub use binance::BinanceKlineAdapter;
pub use bitfinex::BitfinexCandleAdapter;

use crate::error::ParseError;

/// Turns one raw frame from an exchange into a normalized market event.
///
/// `ParseError::UnexpectedShape` marks frames that carry no market data and
/// should be skipped without being reported.
pub trait SourceAdapter: Send {
    type Event;

    fn decode(&self, raw: &[u8]) -> Result<Self::Event, ParseError>;
}

/// Parse raw bytes as JSON, mapping failures to `ParseError::Malformed`.
fn parse_json(raw: &[u8]) -> Result<serde_json::Value, ParseError> {
    serde_json::from_slice(raw).map_err(|e| ParseError::malformed("payload", e.to_string()))
}
