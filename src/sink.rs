// =============================================================================
// Emission sinks
// =============================================================================

use std::collections::HashMap;

use parking_lot::RwLock;
use tracing::info;

use crate::indicators::rsi::rsi_zone;
use crate::types::{Emission, IndicatorKind, Source};

/// Receives every indicator value a processor produces.
pub trait EmissionSink: Send + Sync {
    fn emit(&self, emission: &Emission);
}

/// Logs each emission and remembers the latest one per `(source, indicator)`.
#[derive(Default)]
pub struct LogSink {
    latest: RwLock<HashMap<(Source, IndicatorKind), Emission>>,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn latest(&self, source: Source, indicator: IndicatorKind) -> Option<Emission> {
        self.latest.read().get(&(source, indicator)).cloned()
    }

    /// Latest emissions ordered by source then indicator.
    pub fn snapshot(&self) -> Vec<Emission> {
        let mut all: Vec<Emission> = self.latest.read().values().cloned().collect();
        all.sort_by_key(|e| (e.source.to_string(), e.indicator.to_string()));
        all
    }
}

impl EmissionSink for LogSink {
    fn emit(&self, emission: &Emission) {
        match emission.indicator {
            IndicatorKind::Rsi => info!(
                source = %emission.source,
                close = emission.price,
                rsi = emission.value,
                zone = rsi_zone(emission.value),
                "RSI"
            ),
            IndicatorKind::Vwap => info!(
                source = %emission.source,
                close = emission.price,
                vwap = emission.value,
                "VWAP"
            ),
        }
        self.latest
            .write()
            .insert((emission.source, emission.indicator), emission.clone());
    }
}

/// Test sink that records every emission in order.
#[cfg(test)]
#[derive(Default)]
pub struct RecordingSink {
    emissions: parking_lot::Mutex<Vec<Emission>>,
}

#[cfg(test)]
impl RecordingSink {
    pub fn emissions(&self) -> Vec<Emission> {
        self.emissions.lock().clone()
    }
}

#[cfg(test)]
impl EmissionSink for RecordingSink {
    fn emit(&self, emission: &Emission) {
        self.emissions.lock().push(emission.clone());
    }
}
