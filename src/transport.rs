// =============================================================================
// Transport — delivers connection events to a stream processor
// =============================================================================
//
// A transport owns one connection and drives exactly one processor with
// in-order events: `Open` before any `Message`, nothing after `Close` until
// the next `Open`. Reconnection lives here, not in the processor.
// =============================================================================

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::watch;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::error::ConnectionError;
use crate::processor::StreamProcessor;

/// Connection lifecycle notification.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Open,
    Message(Vec<u8>),
    Error(ConnectionError),
    Close,
}

/// Feeds a processor until the shutdown flag flips to `true` or the
/// transport gives up.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn run(&self, processor: &mut dyn StreamProcessor, shutdown: watch::Receiver<bool>);
}

enum SessionEnd {
    Shutdown,
    /// Remote side went away. `received` is false when no data frame arrived.
    Ended { received: bool },
}

/// WebSocket transport with fixed-delay reconnect.
pub struct WsTransport {
    url: String,
    reconnect_delay: Duration,
    /// Consecutive sessions without data before giving up (0 = never).
    max_reconnect_attempts: u32,
}

impl WsTransport {
    pub fn new(url: impl Into<String>, reconnect_delay: Duration, max_reconnect_attempts: u32) -> Self {
        Self {
            url: url.into(),
            reconnect_delay,
            max_reconnect_attempts,
        }
    }

    async fn session(
        &self,
        processor: &mut dyn StreamProcessor,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<SessionEnd, ConnectionError> {
        let source = processor.source();
        info!(source = %source, url = %self.url, "connecting to WebSocket");

        // The handshake has no timeout of its own.
        let connected = tokio::select! {
            _ = shutdown.changed() => return Ok(SessionEnd::Shutdown),
            result = connect_async(self.url.as_str()) => result,
        };
        let (ws_stream, _response) =
            connected.map_err(|e| ConnectionError::Connect(e.to_string()))?;

        info!(source = %source, "WebSocket connected");
        let (mut write, mut read) = ws_stream.split();

        if let Some(payload) = processor.handle_event(TransportEvent::Open) {
            debug!(source = %source, payload = %payload, "sending subscription");
            let sent = tokio::select! {
                _ = shutdown.changed() => {
                    processor.handle_event(TransportEvent::Close);
                    return Ok(SessionEnd::Shutdown);
                }
                result = write.send(Message::Text(payload)) => result,
            };
            if let Err(e) = sent {
                processor.handle_event(TransportEvent::Error(ConnectionError::Send(e.to_string())));
                processor.handle_event(TransportEvent::Close);
                return Ok(SessionEnd::Ended { received: false });
            }
        }

        let mut received = false;
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    let _ = write.send(Message::Close(None)).await;
                    processor.handle_event(TransportEvent::Close);
                    return Ok(SessionEnd::Shutdown);
                }
                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        received = true;
                        processor.handle_event(TransportEvent::Message(text.into_bytes()));
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        received = true;
                        processor.handle_event(TransportEvent::Message(bytes));
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!(source = %source, frame = ?frame, "close frame received");
                        processor.handle_event(TransportEvent::Close);
                        return Ok(SessionEnd::Ended { received });
                    }
                    // tungstenite answers pings itself.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        processor.handle_event(TransportEvent::Error(ConnectionError::Read(e.to_string())));
                        processor.handle_event(TransportEvent::Close);
                        return Ok(SessionEnd::Ended { received });
                    }
                    None => {
                        warn!(source = %source, "WebSocket stream ended");
                        processor.handle_event(TransportEvent::Close);
                        return Ok(SessionEnd::Ended { received });
                    }
                },
            }
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn run(&self, processor: &mut dyn StreamProcessor, mut shutdown: watch::Receiver<bool>) {
        let source = processor.source();
        let mut failures: u32 = 0;

        loop {
            let stop = *shutdown.borrow();
            if stop {
                break;
            }

            match self.session(processor, &mut shutdown).await {
                Ok(SessionEnd::Shutdown) => break,
                Ok(SessionEnd::Ended { received: true }) => failures = 0,
                Ok(SessionEnd::Ended { received: false }) => failures += 1,
                Err(err) => {
                    processor.handle_event(TransportEvent::Error(err));
                    failures += 1;
                }
            }

            if self.max_reconnect_attempts > 0 && failures >= self.max_reconnect_attempts {
                warn!(source = %source, failures, "giving up on WebSocket after repeated failures");
                break;
            }

            info!(
                source = %source,
                delay_secs = self.reconnect_delay.as_secs(),
                "reconnecting"
            );
            tokio::select! {
                _ = tokio::time::sleep(self.reconnect_delay) => {}
                _ = shutdown.changed() => break,
            }
        }

        info!(source = %source, "transport stopped");
    }
}

/// Plays back a fixed list of events; records outbound payloads.
#[cfg(test)]
pub struct ReplayTransport {
    events: Vec<TransportEvent>,
    sent: parking_lot::Mutex<Vec<String>>,
}

#[cfg(test)]
impl ReplayTransport {
    pub fn new(events: Vec<TransportEvent>) -> Self {
        Self {
            events,
            sent: parking_lot::Mutex::new(Vec::new()),
        }
    }

    /// Open, one message per frame, close.
    pub fn session<I, B>(frames: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Vec<u8>>,
    {
        let mut events = vec![TransportEvent::Open];
        events.extend(frames.into_iter().map(|f| TransportEvent::Message(f.into())));
        events.push(TransportEvent::Close);
        Self::new(events)
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().clone()
    }
}

#[cfg(test)]
#[async_trait]
impl Transport for ReplayTransport {
    async fn run(&self, processor: &mut dyn StreamProcessor, shutdown: watch::Receiver<bool>) {
        for event in self.events.iter().cloned() {
            let stop = *shutdown.borrow();
            if stop {
                break;
            }
            if let Some(payload) = processor.handle_event(event) {
                self.sent.lock().push(payload);
            }
            tokio::task::yield_now().await;
        }
    }
}
