// =============================================================================
// Pulse Feed — streaming RSI / VWAP over exchange WebSockets
// =============================================================================

pub mod dispatcher;
pub mod error;
pub mod indicators;
pub mod market_data;
pub mod processor;
pub mod runtime_config;
pub mod sink;
pub mod transport;
pub mod types;
