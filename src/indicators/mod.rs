// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Incremental, single-owner indicator state. Each stream processor owns its
// own instance and feeds it one event at a time.

pub mod rsi;
pub mod vwap;

pub use rsi::RollingWindowRsi;
pub use vwap::{CumulativeVwap, VwapAnchor};
