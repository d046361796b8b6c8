// =============================================================================
// Relative Strength Index (RSI) — Trailing Window
// =============================================================================
//
// Classic trailing-window RSI over the last `capacity` closes (no Wilder
// smoothing):
//
// Step 1 — Keep the most recent `capacity` closes in a FIFO buffer.
// Step 2 — Take the pairwise deltas of the buffer (`capacity - 1` of them).
// Step 3 — P = mean of the positive deltas, N = mean of |negative deltas|.
//          Zero deltas count toward neither. An empty side averages to 0.
// Step 4 — N == 0  => RSI = 100
//          else    => RSI = 100 - 100 / (1 + P / N)
//
// Thresholds:  RSI >= 70 => OVERBOUGHT,  RSI <= 30 => OVERSOLD.
// =============================================================================

use std::collections::VecDeque;

/// Window length used when nothing else is configured.
pub const DEFAULT_RSI_PERIOD: usize = 14;

/// Bounded rolling buffer of closes with an RSI read-out.
///
/// Invariant: `len() <= capacity()`. Pushing past capacity evicts the oldest
/// close.
#[derive(Debug, Clone)]
pub struct RollingWindowRsi {
    buffer: VecDeque<f64>,
    capacity: usize,
}

impl Default for RollingWindowRsi {
    fn default() -> Self {
        Self::new(DEFAULT_RSI_PERIOD)
    }
}

impl RollingWindowRsi {
    /// A zero capacity is bumped to 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// `true` once the buffer holds exactly `capacity` closes.
    pub fn is_full(&self) -> bool {
        self.buffer.len() == self.capacity
    }

    /// Most recent close, if any.
    pub fn last(&self) -> Option<f64> {
        self.buffer.back().copied()
    }

    /// Append a close and trim the buffer to capacity, without computing.
    pub fn push(&mut self, price: f64) {
        self.buffer.push_back(price);
        while self.buffer.len() > self.capacity {
            self.buffer.pop_front();
        }
    }

    /// RSI over the current buffer, `None` until the buffer is full.
    pub fn value(&self) -> Option<f64> {
        if !self.is_full() {
            return None;
        }

        let (mut gain_sum, mut gain_n) = (0.0_f64, 0_usize);
        let (mut loss_sum, mut loss_n) = (0.0_f64, 0_usize);
        for (prev, next) in self.buffer.iter().zip(self.buffer.iter().skip(1)) {
            let delta = next - prev;
            if delta > 0.0 {
                gain_sum += delta;
                gain_n += 1;
            } else if delta < 0.0 {
                loss_sum += delta.abs();
                loss_n += 1;
            }
        }

        Some(rsi_from_averages(
            mean(gain_sum, gain_n),
            mean(loss_sum, loss_n),
        ))
    }

    /// Push a close and return the RSI when the window is full.
    pub fn update(&mut self, price: f64) -> Option<f64> {
        self.push(price);
        self.value()
    }
}

/// Human-readable zone for an RSI value.
pub fn rsi_zone(value: f64) -> &'static str {
    if value >= 70.0 {
        "OVERBOUGHT"
    } else if value <= 30.0 {
        "OVERSOLD"
    } else {
        "NEUTRAL"
    }
}

// =============================================================================
// Internal helpers
// =============================================================================

fn mean(sum: f64, n: usize) -> f64 {
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

/// Convert average gain / average loss into an RSI value.
///
/// Zero average loss (including no movement at all) maps to 100.
fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        100.0
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    }
}
