// =============================================================================
// Volume-Weighted Average Price (VWAP) — Cumulative
// =============================================================================
//
// VWAP over every candle appended so far (or, with a daily anchor, since the
// start of the current UTC day):
//
//   typical_i = (high_i + low_i + close_i) / 3
//   VWAP      = Σ(typical_i * volume_i) / Σ(volume_i)
//
// Numerator and denominator are running sums, so each update is O(1). Candles
// are taken in arrival order and never revisited.
//
// A zero total volume yields NaN.
// =============================================================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::Candle;

/// Where a VWAP session starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VwapAnchor {
    /// One session for the whole process lifetime.
    #[default]
    None,
    /// New session whenever a candle opens on a different UTC day.
    Daily,
}

/// Running VWAP accumulator owned by a single stream.
#[derive(Debug, Clone, Default)]
pub struct CumulativeVwap {
    anchor: VwapAnchor,
    price_volume_sum: f64,
    volume_sum: f64,
    /// Candles folded in over the lifetime of the accumulator.
    bars: usize,
    /// Candles in the current session.
    session_bars: usize,
    session_day: Option<NaiveDate>,
}

impl CumulativeVwap {
    pub fn new(anchor: VwapAnchor) -> Self {
        Self {
            anchor,
            ..Self::default()
        }
    }

    pub fn bars(&self) -> usize {
        self.bars
    }

    pub fn session_bars(&self) -> usize {
        self.session_bars
    }

    pub fn is_empty(&self) -> bool {
        self.bars == 0
    }

    pub fn total_volume(&self) -> f64 {
        self.volume_sum
    }

    /// Append a candle and return the VWAP including it.
    pub fn update(&mut self, candle: &Candle) -> f64 {
        if self.anchor == VwapAnchor::Daily {
            self.roll_session(candle);
        }

        self.price_volume_sum += candle.typical_price() * candle.volume;
        self.volume_sum += candle.volume;
        self.bars += 1;
        self.session_bars += 1;

        self.value().unwrap_or(f64::NAN)
    }

    /// Current VWAP. `None` before the first candle, NaN on zero volume.
    pub fn value(&self) -> Option<f64> {
        if self.session_bars == 0 {
            return None;
        }
        if self.volume_sum == 0.0 {
            return Some(f64::NAN);
        }
        Some(self.price_volume_sum / self.volume_sum)
    }

    fn roll_session(&mut self, candle: &Candle) {
        // Unknown time never opens a new session.
        let Some(day) = candle.open_time().map(|t| t.date_naive()) else {
            return;
        };
        if self.session_day.is_some_and(|current| current != day) {
            self.price_volume_sum = 0.0;
            self.volume_sum = 0.0;
            self.session_bars = 0;
        }
        self.session_day = Some(day);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY_MS: i64 = 86_400_000;

    fn candle(ts: i64, close: f64, high: f64, low: f64, volume: f64) -> Candle {
        Candle {
            timestamp: ts,
            open: close,
            close,
            high,
            low,
            volume,
        }
    }

    #[test]
    fn empty_has_no_value() {
        let vwap = CumulativeVwap::default();
        assert!(vwap.is_empty());
        assert_eq!(vwap.value(), None);
    }

    #[test]
    fn single_candle_equals_typical_price() {
        let mut vwap = CumulativeVwap::default();
        let v = vwap.update(&candle(0, 9.0, 10.0, 8.0, 100.0));
        assert!((v - 9.0).abs() < 1e-12, "expected 9.0, got {v}");
    }

    #[test]
    fn zero_volume_candle_leaves_value_unchanged() {
        let mut vwap = CumulativeVwap::default();
        let before = vwap.update(&candle(0, 9.0, 10.0, 8.0, 100.0));
        let after = vwap.update(&candle(60_000, 50.0, 60.0, 40.0, 0.0));
        assert_eq!(before, after);
        assert_eq!(vwap.bars(), 2);
    }

    #[test]
    fn zero_total_volume_is_nan() {
        let mut vwap = CumulativeVwap::default();
        assert!(vwap.update(&candle(0, 1.0, 1.0, 1.0, 0.0)).is_nan());
    }

    #[test]
    fn weights_by_volume_across_history() {
        let mut vwap = CumulativeVwap::default();
        // Typical 2.0 with volume 10, typical 4.0 with volume 30 => 3.5.
        vwap.update(&candle(0, 2.0, 3.0, 1.0, 10.0));
        let v = vwap.update(&candle(1, 4.0, 5.0, 3.0, 30.0));
        assert!((v - 3.5).abs() < 1e-12, "expected 3.5, got {v}");
        assert!((vwap.total_volume() - 40.0).abs() < 1e-12);
    }

    #[test]
    fn no_anchor_never_resets() {
        let mut vwap = CumulativeVwap::new(VwapAnchor::None);
        vwap.update(&candle(0, 2.0, 2.0, 2.0, 10.0));
        let v = vwap.update(&candle(3 * DAY_MS, 4.0, 4.0, 4.0, 10.0));
        assert!((v - 3.0).abs() < 1e-12);
        assert_eq!(vwap.session_bars(), 2);
    }

    #[test]
    fn daily_anchor_resets_on_new_day() {
        let mut vwap = CumulativeVwap::new(VwapAnchor::Daily);
        vwap.update(&candle(DAY_MS - 60_000, 2.0, 2.0, 2.0, 10.0));
        let v = vwap.update(&candle(DAY_MS, 4.0, 4.0, 4.0, 10.0));
        assert!((v - 4.0).abs() < 1e-12, "expected fresh session, got {v}");
        assert_eq!(vwap.session_bars(), 1);
        assert_eq!(vwap.bars(), 2);
    }

    #[test]
    fn daily_anchor_ignores_invalid_timestamp() {
        let mut vwap = CumulativeVwap::new(VwapAnchor::Daily);
        vwap.update(&candle(0, 2.0, 2.0, 2.0, 10.0));
        let v = vwap.update(&candle(Candle::INVALID_TIMESTAMP, 4.0, 4.0, 4.0, 10.0));
        assert!((v - 3.0).abs() < 1e-12);
    }
}
