// =============================================================================
// Dispatcher — one processor per source, sources run independently
// =============================================================================
//
// Inbound events are routed by source identity. In `run` every processor
// moves into its own task together with its transport, so the sources share
// no mutable state and a failure in one never reaches the other. All tasks
// observe the same shutdown flag and are joined before `run` returns.
// =============================================================================

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::processor::{ProcessorStats, StreamProcessor};
use crate::transport::{Transport, TransportEvent};
use crate::types::Source;

#[derive(Default)]
pub struct Dispatcher {
    processors: Vec<Box<dyn StreamProcessor>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a processor. Each source may be registered once.
    pub fn register(&mut self, processor: Box<dyn StreamProcessor>) -> Result<()> {
        let source = processor.source();
        if self.processor(source).is_some() {
            bail!("a processor is already registered for {source}");
        }
        self.processors.push(processor);
        Ok(())
    }

    pub fn sources(&self) -> Vec<Source> {
        self.processors.iter().map(|p| p.source()).collect()
    }

    pub fn processor(&self, source: Source) -> Option<&dyn StreamProcessor> {
        self.processors
            .iter()
            .find(|p| p.source() == source)
            .map(|p| &**p)
    }

    /// Deliver one event to the processor for `source`. Returns the payload
    /// the transport must send back, if any.
    pub fn dispatch(&mut self, source: Source, event: TransportEvent) -> Option<String> {
        match self.processors.iter_mut().find(|p| p.source() == source) {
            Some(processor) => processor.handle_event(event),
            None => {
                warn!(source = %source, "no processor registered, event dropped");
                None
            }
        }
    }

    /// Run every processor against its transport until shutdown, then return
    /// the final stats of each task that finished cleanly.
    pub async fn run(
        self,
        mut transports: HashMap<Source, Arc<dyn Transport>>,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<(Source, ProcessorStats)> {
        let mut tasks = Vec::with_capacity(self.processors.len());

        for mut processor in self.processors {
            let source = processor.source();
            let Some(transport) = transports.remove(&source) else {
                warn!(source = %source, "no transport configured, source not started");
                continue;
            };
            let shutdown = shutdown.clone();
            let handle = tokio::spawn(async move {
                transport.run(processor.as_mut(), shutdown).await;
                processor.stats()
            });
            info!(source = %source, "stream task started");
            tasks.push((source, handle));
        }

        let mut report = Vec::with_capacity(tasks.len());
        for (source, handle) in tasks {
            match handle.await {
                Ok(stats) => report.push((source, stats)),
                Err(e) => error!(source = %source, error = %e, "stream task failed"),
            }
        }
        report
    }

    /// Run until every source ends or `signal` resolves. A failed signal
    /// listener still stops the sources before returning.
    pub async fn run_until<S>(
        self,
        transports: HashMap<Source, Arc<dyn Transport>>,
        signal: S,
    ) -> Result<Vec<(Source, ProcessorStats)>>
    where
        S: Future<Output = std::io::Result<()>>,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut streams = tokio::spawn(self.run(transports, shutdown_rx));

        let report = tokio::select! {
            signal = signal => {
                match signal {
                    Ok(()) => warn!("shutdown signal received, stopping all streams"),
                    Err(e) => error!(error = %e, "signal listener failed, stopping all streams"),
                }
                let _ = shutdown_tx.send(true);
                (&mut streams).await
            }
            done = &mut streams => {
                warn!("all streams ended on their own");
                done
            }
        };
        report.context("stream dispatcher task failed")
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::indicators::vwap::VwapAnchor;
    use crate::processor::{RsiProcessor, StreamState, VwapProcessor};
    use crate::sink::RecordingSink;
    use crate::transport::ReplayTransport;
    use crate::types::IndicatorKind;

    fn kline(close: f64, closed: bool) -> Vec<u8> {
        format!(r#"{{"k":{{"c":"{close}","x":{closed}}}}}"#).into_bytes()
    }

    fn dispatcher(sink: &Arc<RecordingSink>) -> Dispatcher {
        let mut d = Dispatcher::new();
        d.register(Box::new(RsiProcessor::new(14, sink.clone()))).unwrap();
        d.register(Box::new(VwapProcessor::new(
            "candles",
            "trade:1m:tBTCUSD",
            VwapAnchor::None,
            sink.clone(),
        )))
        .unwrap();
        d
    }

    #[test]
    fn duplicate_source_is_rejected() {
        let sink = Arc::new(RecordingSink::default());
        let mut d = dispatcher(&sink);
        assert!(d.register(Box::new(RsiProcessor::new(14, sink.clone()))).is_err());
        assert_eq!(d.sources(), vec![Source::Binance, Source::Bitfinex]);
    }

    #[test]
    fn unknown_source_is_dropped() {
        let mut d = Dispatcher::new();
        assert_eq!(d.dispatch(Source::Binance, TransportEvent::Open), None);
        assert!(d.processor(Source::Binance).is_none());
    }

    #[test]
    fn binance_end_to_end_first_emission_on_fourteenth_tick() {
        let sink = Arc::new(RecordingSink::default());
        let mut d = dispatcher(&sink);
        assert_eq!(d.dispatch(Source::Binance, TransportEvent::Open), None);

        for i in 1..=13 {
            d.dispatch(Source::Binance, TransportEvent::Message(kline(f64::from(i), true)));
            assert!(sink.emissions().is_empty(), "emitted early at tick {i}");
        }
        d.dispatch(Source::Binance, TransportEvent::Message(kline(14.0, true)));

        let emissions = sink.emissions();
        assert_eq!(emissions.len(), 1);
        assert_eq!(emissions[0].source, Source::Binance);
        assert_eq!(emissions[0].indicator, IndicatorKind::Rsi);
        assert_eq!(emissions[0].value, 100.0);
    }

    #[test]
    fn bitfinex_end_to_end_cumulative_vwap() {
        let sink = Arc::new(RecordingSink::default());
        let mut d = dispatcher(&sink);
        let sub = d.dispatch(Source::Bitfinex, TransportEvent::Open).expect("subscription");
        assert!(sub.contains("trade:1m:tBTCUSD"));

        d.dispatch(Source::Bitfinex, TransportEvent::Message(b"[1,[1000,1,2,3,0,10]]".to_vec()));
        d.dispatch(Source::Bitfinex, TransportEvent::Message(b"[1,[2000,2,3,4,1,20]]".to_vec()));

        let values: Vec<f64> = sink.emissions().iter().map(|e| e.value).collect();
        assert_eq!(values.len(), 2);
        assert!((values[0] - 5.0 / 3.0).abs() < 1e-12);
        // Two-bar weighted average, not just the second bar's 8/3.
        assert!((values[1] - 7.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn parse_failure_on_one_source_leaves_other_untouched() {
        let sink = Arc::new(RecordingSink::default());
        let mut d = dispatcher(&sink);
        d.dispatch(Source::Binance, TransportEvent::Open);
        d.dispatch(Source::Bitfinex, TransportEvent::Open);

        d.dispatch(Source::Binance, TransportEvent::Message(b"{broken".to_vec()));
        d.dispatch(Source::Binance, TransportEvent::Close);
        d.dispatch(Source::Bitfinex, TransportEvent::Message(b"[1,[1000,1,2,3,0,10]]".to_vec()));

        let binance = d.processor(Source::Binance).unwrap();
        let bitfinex = d.processor(Source::Bitfinex).unwrap();
        assert_eq!(binance.stats().parse_errors, 1);
        assert_eq!(binance.state(), StreamState::Closed);
        assert_eq!(bitfinex.stats().parse_errors, 0);
        assert_eq!(bitfinex.state(), StreamState::Active);
        assert_eq!(sink.emissions().len(), 1);
    }

    #[tokio::test]
    async fn run_drives_both_sources_concurrently() {
        let sink = Arc::new(RecordingSink::default());
        let d = dispatcher(&sink);

        let binance = ReplayTransport::session((1..=14).map(|i| kline(f64::from(i), true)));
        let bitfinex = ReplayTransport::session([
            r#"{"event":"subscribed","channel":"candles","chanId":1}"#,
            "[1,[1000,1,2,3,0,10]]",
            "[1,[2000,2,3,4,1,20]]",
        ]);
        let mut transports: HashMap<Source, Arc<dyn Transport>> = HashMap::new();
        transports.insert(Source::Binance, Arc::new(binance));
        transports.insert(Source::Bitfinex, Arc::new(bitfinex));

        let (_tx, rx) = watch::channel(false);
        let mut report = d.run(transports, rx).await;
        report.sort_by_key(|(s, _)| s.to_string());

        assert_eq!(report.len(), 2);
        assert_eq!(report[0].0, Source::Binance);
        assert_eq!(report[0].1.emitted, 1);
        assert_eq!(report[1].0, Source::Bitfinex);
        assert_eq!(report[1].1.emitted, 2);
        assert_eq!(report[1].1.skipped, 1);
        assert_eq!(sink.emissions().len(), 3);
    }

    struct PanickingTransport;

    #[async_trait]
    impl Transport for PanickingTransport {
        async fn run(&self, _processor: &mut dyn StreamProcessor, _shutdown: watch::Receiver<bool>) {
            panic!("transport blew up");
        }
    }

    #[tokio::test]
    async fn panic_in_one_task_does_not_stop_the_other() {
        let sink = Arc::new(RecordingSink::default());
        let d = dispatcher(&sink);

        let mut transports: HashMap<Source, Arc<dyn Transport>> = HashMap::new();
        transports.insert(Source::Binance, Arc::new(PanickingTransport));
        transports.insert(
            Source::Bitfinex,
            Arc::new(ReplayTransport::session(["[1,[1000,1,2,3,0,10]]"])),
        );

        let (_tx, rx) = watch::channel(false);
        let report = d.run(transports, rx).await;

        assert_eq!(report.len(), 1);
        assert_eq!(report[0].0, Source::Bitfinex);
        assert_eq!(report[0].1.emitted, 1);
    }

    /// Opens, then idles until shutdown.
    struct IdleTransport;

    #[async_trait]
    impl Transport for IdleTransport {
        async fn run(&self, processor: &mut dyn StreamProcessor, mut shutdown: watch::Receiver<bool>) {
            processor.handle_event(TransportEvent::Open);
            while !*shutdown.borrow() {
                if shutdown.changed().await.is_err() {
                    break;
                }
            }
            processor.handle_event(TransportEvent::Close);
        }
    }

    fn idle_transports() -> HashMap<Source, Arc<dyn Transport>> {
        let mut transports: HashMap<Source, Arc<dyn Transport>> = HashMap::new();
        transports.insert(Source::Binance, Arc::new(IdleTransport));
        transports.insert(Source::Bitfinex, Arc::new(IdleTransport));
        transports
    }

    #[tokio::test]
    async fn signal_stops_both_sources() {
        let sink = Arc::new(RecordingSink::default());
        let d = dispatcher(&sink);

        let signal = async {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            Ok(())
        };
        let report = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            d.run_until(idle_transports(), signal),
        )
        .await
        .expect("both sources stop on signal")
        .unwrap();

        assert_eq!(report.len(), 2);
    }

    #[tokio::test]
    async fn failed_signal_listener_still_stops_both_sources() {
        let sink = Arc::new(RecordingSink::default());
        let d = dispatcher(&sink);

        let signal = async { Err(std::io::Error::new(std::io::ErrorKind::Other, "no handler")) };
        let report = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            d.run_until(idle_transports(), signal),
        )
        .await
        .expect("sources must not be left running")
        .unwrap();

        assert_eq!(report.len(), 2);
    }

    #[tokio::test]
    async fn run_until_returns_when_streams_end_first() {
        let sink = Arc::new(RecordingSink::default());
        let d = dispatcher(&sink);
        let mut transports: HashMap<Source, Arc<dyn Transport>> = HashMap::new();
        transports.insert(
            Source::Bitfinex,
            Arc::new(ReplayTransport::session(["[1,[1000,1,2,3,0,10]]"])),
        );

        let report = d
            .run_until(transports, std::future::pending())
            .await
            .unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].1.emitted, 1);
    }

    #[tokio::test]
    async fn source_without_transport_is_not_started() {
        let sink = Arc::new(RecordingSink::default());
        let d = dispatcher(&sink);
        let mut transports: HashMap<Source, Arc<dyn Transport>> = HashMap::new();
        transports.insert(
            Source::Bitfinex,
            Arc::new(ReplayTransport::session(Vec::<Vec<u8>>::new())),
        );

        let (_tx, rx) = watch::channel(false);
        let report = d.run(transports, rx).await;
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].1.emitted, 0);
    }
}
