// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Consumption and lifecycle orchestration for the spread collector.
//!
//! [`CollectorService`] pulls price updates from a [`PriceSource`], enriches
//! them against the static instrument table, and hands them to a
//! [`SpreadRecorder`], while a background task flushes the recorder on a
//! fixed interval. Shutdown is an ordered, best-effort sequence: cancel the
//! shared token, settle the background tasks, final flush, close the
//! source, close the recorder.

mod error;
mod source;

pub use error::CollectorError;
pub use source::{BoxError, PriceSource, TokenRefresh};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use core_types::{Instrument, PriceData, PriceUpdate};
use log::{error, info, warn};
use parking_lot::Mutex;
use spread_recorder::SpreadRecorder;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

/// Lifecycle states; transitions only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ServiceState {
    Idle,
    Starting,
    Running,
    Stopping,
    Stopped,
}

pub struct CollectorService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    source: Arc<dyn PriceSource>,
    recorder: Arc<dyn SpreadRecorder>,
    instruments: HashMap<String, Instrument>,
    flush_interval: Duration,
    /// One shared token; every background task observes it.
    cancel: CancellationToken,
    /// Fires once the shutdown sequence has fully completed.
    stopped: CancellationToken,
    state: Mutex<ServiceState>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl CollectorService {
    pub fn new(
        source: Arc<dyn PriceSource>,
        instruments: HashMap<String, Instrument>,
        recorder: Arc<dyn SpreadRecorder>,
        flush_interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(ServiceInner {
                source,
                recorder,
                instruments,
                flush_interval,
                cancel: CancellationToken::new(),
                stopped: CancellationToken::new(),
                state: Mutex::new(ServiceState::Idle),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Connects the source, subscribes to every configured instrument, and
    /// spawns the consumption loop plus the periodic flush task.
    pub async fn start(&self) -> Result<(), CollectorError> {
        self.inner.clone().start().await
    }

    /// Runs the shutdown sequence. Safe to invoke at most once; later calls
    /// return [`CollectorError::NotRunning`].
    pub async fn stop(&self) -> Result<(), CollectorError> {
        self.inner.clone().shutdown().await
    }

    /// Resolves once the shared cancellation signal fires, whether from
    /// [`stop`](Self::stop) or from source exhaustion.
    pub async fn cancelled(&self) {
        self.inner.cancel.cancelled().await;
    }

    /// Resolves once the shutdown sequence has completed.
    pub async fn wait_stopped(&self) {
        self.inner.stopped.cancelled().await;
    }
}

impl ServiceInner {
    async fn start(self: Arc<Self>) -> Result<(), CollectorError> {
        {
            let mut state = self.state.lock();
            if *state != ServiceState::Idle {
                return Err(CollectorError::AlreadyStarted);
            }
            *state = ServiceState::Starting;
        }
        info!("starting spread collector");

        let (connected_tx, connected_rx) = oneshot::channel();
        if let Some(refresh) = self.source.token_refresh() {
            let cancel = self.cancel.clone();
            let handle = tokio::spawn(async move { refresh.run(connected_rx, cancel).await });
            self.tasks.lock().push(handle);
            info!("token refresh task started");
        }

        if let Err(err) = self.source.connect().await {
            self.abort_start();
            return Err(CollectorError::Connect(err.to_string()));
        }
        info!("price source connected");
        let _ = connected_tx.send(());

        let tickers: Vec<String> = self.instruments.keys().cloned().collect();
        info!("subscribing to {} instruments", tickers.len());
        let rx = match self.source.subscribe(&tickers).await {
            Ok(rx) => rx,
            Err(err) => {
                self.abort_start();
                return Err(CollectorError::Subscribe(err.to_string()));
            }
        };

        let consumer = {
            let inner = self.clone();
            tokio::spawn(async move { inner.consume_updates(rx).await })
        };
        let flusher = {
            let inner = self.clone();
            tokio::spawn(async move { inner.periodic_flush().await })
        };
        {
            let mut tasks = self.tasks.lock();
            tasks.push(consumer);
            tasks.push(flusher);
        }

        *self.state.lock() = ServiceState::Running;
        info!("spread collector started");
        Ok(())
    }

    /// Failed start: release anything spawned so far and go terminal.
    fn abort_start(&self) {
        self.cancel.cancel();
        *self.state.lock() = ServiceState::Stopped;
        self.stopped.cancel();
    }

    /// Consumption loop. Exits on cancellation without draining the queue;
    /// a closed queue means the upstream ended and triggers the full
    /// shutdown sequence.
    async fn consume_updates(self: Arc<Self>, mut rx: mpsc::Receiver<PriceUpdate>) {
        let mut processed: u64 = 0;
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("price processor stopping ({} updates)", processed);
                    return;
                }
                update = rx.recv() => {
                    let Some(update) = update else {
                        info!("price channel closed after {} updates", processed);
                        break;
                    };
                    let data = match self.map_update(update) {
                        Ok(data) => data,
                        Err(err) => {
                            warn!("skipping price update: {}", err);
                            continue;
                        }
                    };
                    if let Err(err) = self.recorder.record(&data) {
                        error!("error recording price for {}: {}", data.ticker, err);
                        continue;
                    }
                    processed += 1;
                    if processed % 100 == 0 {
                        info!("processed {} price updates", processed);
                    }
                }
            }
        }
        // Source exhausted; run the shutdown from a fresh task so this one
        // can settle and be joined like the others.
        let inner = self.clone();
        tokio::spawn(async move {
            if let Err(err) = inner.shutdown().await {
                info!("shutdown after source exhaustion skipped: {}", err);
            }
        });
    }

    async fn periodic_flush(self: Arc<Self>) {
        info!("starting periodic flush (every {:?})", self.flush_interval);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = sleep(self.flush_interval) => {
                    if let Err(err) = self.recorder.flush() {
                        error!("periodic flush error: {}", err);
                    }
                }
            }
        }
    }

    fn map_update(&self, update: PriceUpdate) -> Result<PriceData, CollectorError> {
        let instrument = self
            .instruments
            .get(&update.ticker)
            .ok_or_else(|| CollectorError::UnknownInstrument(update.ticker.clone()))?;
        let mut data = PriceData {
            timestamp: update.timestamp,
            uic: instrument.uic,
            ticker: update.ticker,
            asset_type: instrument.asset_type.clone(),
            bid: update.bid,
            ask: update.ask,
            spread: 0.0,
            decimals: instrument.decimals,
        };
        data.compute_spread();
        Ok(data)
    }

    /// Ordered, best-effort shutdown. Each step's failure is logged and
    /// never aborts the later steps.
    async fn shutdown(self: Arc<Self>) -> Result<(), CollectorError> {
        {
            let mut state = self.state.lock();
            match *state {
                ServiceState::Starting | ServiceState::Running => {
                    *state = ServiceState::Stopping;
                }
                _ => return Err(CollectorError::NotRunning),
            }
        }
        info!("stopping spread collector");

        // Stops the flush timer and unblocks the consumption loop; both
        // settle before anything below touches the recorder.
        self.cancel.cancel();
        let handles: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for handle in handles {
            if let Err(err) = handle.await {
                warn!("background task ended abnormally: {}", err);
            }
        }

        info!("performing final flush");
        if let Err(err) = self.recorder.flush() {
            error!("final flush error: {}", err);
        }

        info!("closing price source");
        if let Err(err) = self.source.close().await {
            error!("price source close error: {}", err);
        }

        info!("closing spread recorder");
        if let Err(err) = self.recorder.close() {
            error!("recorder close error: {}", err);
        }

        *self.state.lock() = ServiceState::Stopped;
        self.stopped.cancel();
        info!("spread collector stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use spread_recorder::CsvSpreadRecorder;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::tempdir;
    use tokio::time::timeout;

    struct ScriptedSource {
        updates: Vec<PriceUpdate>,
        hold_open: bool,
        refresh: Option<Arc<dyn TokenRefresh>>,
        tx_slot: Mutex<Option<mpsc::Sender<PriceUpdate>>>,
        closed: Arc<AtomicBool>,
    }

    impl ScriptedSource {
        fn new(updates: Vec<PriceUpdate>, hold_open: bool) -> Self {
            Self {
                updates,
                hold_open,
                refresh: None,
                tx_slot: Mutex::new(None),
                closed: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    #[async_trait]
    impl PriceSource for ScriptedSource {
        async fn connect(&self) -> Result<(), BoxError> {
            Ok(())
        }

        async fn subscribe(
            &self,
            _tickers: &[String],
        ) -> Result<mpsc::Receiver<PriceUpdate>, BoxError> {
            let (tx, rx) = mpsc::channel(self.updates.len() + 1);
            for update in self.updates.iter().cloned() {
                tx.send(update).await.unwrap();
            }
            if self.hold_open {
                *self.tx_slot.lock() = Some(tx);
            }
            Ok(rx)
        }

        async fn close(&self) -> Result<(), BoxError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn token_refresh(&self) -> Option<Arc<dyn TokenRefresh>> {
            self.refresh.clone()
        }
    }

    struct RefreshProbe {
        connected_seen: Arc<AtomicBool>,
        cancelled_seen: Arc<AtomicBool>,
    }

    #[async_trait]
    impl TokenRefresh for RefreshProbe {
        async fn run(&self, connected: oneshot::Receiver<()>, cancel: CancellationToken) {
            if connected.await.is_ok() {
                self.connected_seen.store(true, Ordering::SeqCst);
            }
            cancel.cancelled().await;
            self.cancelled_seen.store(true, Ordering::SeqCst);
        }
    }

    fn instrument(ticker: &str, uic: i32, decimals: i32) -> Instrument {
        Instrument {
            ticker: ticker.to_string(),
            uic,
            asset_type: "FxSpot".to_string(),
            decimals,
        }
    }

    fn test_instruments() -> HashMap<String, Instrument> {
        [instrument("EURUSD", 21, 4), instrument("USDJPY", 42, 2)]
            .into_iter()
            .map(|inst| (inst.ticker.clone(), inst))
            .collect()
    }

    fn update(ticker: &str, timestamp: &str, bid: f64, ask: f64) -> PriceUpdate {
        PriceUpdate {
            ticker: ticker.to_string(),
            timestamp: timestamp.parse().unwrap(),
            bid,
            ask,
        }
    }

    fn read_lines(base: &std::path::Path, relative: &str) -> Vec<String> {
        std::fs::read_to_string(base.join(relative))
            .unwrap()
            .lines()
            .map(|line| line.to_string())
            .collect()
    }

    #[tokio::test]
    async fn buffered_record_survives_stop() {
        let dir = tempdir().unwrap();
        let recorder = Arc::new(CsvSpreadRecorder::new(dir.path()));
        let source = Arc::new(ScriptedSource::new(
            vec![update("EURUSD", "2025-11-18T12:00:00Z", 1.08642, 1.08652)],
            true,
        ));
        let closed = source.closed.clone();
        // Long flush interval: only the final flush can make the row durable.
        let service = CollectorService::new(
            source,
            test_instruments(),
            recorder,
            Duration::from_secs(3600),
        );
        service.start().await.unwrap();
        sleep(Duration::from_millis(200)).await;
        service.stop().await.unwrap();

        let lines = read_lines(dir.path(), "20251118/EURUSD_12.csv");
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[1],
            "2025-11-18T12:00:00.000000000Z,21,EURUSD,FxSpot,1.0864,1.0865,0.0001"
        );
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn unknown_ticker_is_skipped_not_fatal() {
        let dir = tempdir().unwrap();
        let recorder = Arc::new(CsvSpreadRecorder::new(dir.path()));
        let source = Arc::new(ScriptedSource::new(
            vec![
                update("GBPUSD", "2025-11-18T12:00:00Z", 1.26, 1.27),
                update("EURUSD", "2025-11-18T12:00:01Z", 1.0864, 1.0866),
            ],
            true,
        ));
        let service = CollectorService::new(
            source,
            test_instruments(),
            recorder,
            Duration::from_secs(3600),
        );
        service.start().await.unwrap();
        sleep(Duration::from_millis(200)).await;
        service.stop().await.unwrap();

        let lines = read_lines(dir.path(), "20251118/EURUSD_12.csv");
        assert_eq!(lines.len(), 2);
        assert!(!dir.path().join("20251118/GBPUSD_12.csv").exists());
    }

    #[tokio::test]
    async fn stop_is_a_one_shot_transition() {
        let dir = tempdir().unwrap();
        let recorder = Arc::new(CsvSpreadRecorder::new(dir.path()));
        let source = Arc::new(ScriptedSource::new(Vec::new(), true));
        let service = CollectorService::new(
            source,
            test_instruments(),
            recorder,
            Duration::from_secs(3600),
        );
        service.start().await.unwrap();
        service.stop().await.unwrap();
        assert!(matches!(
            service.stop().await,
            Err(CollectorError::NotRunning)
        ));
    }

    #[tokio::test]
    async fn start_is_rejected_once_started() {
        let dir = tempdir().unwrap();
        let recorder = Arc::new(CsvSpreadRecorder::new(dir.path()));
        let source = Arc::new(ScriptedSource::new(Vec::new(), true));
        let service = CollectorService::new(
            source,
            test_instruments(),
            recorder,
            Duration::from_secs(3600),
        );
        service.start().await.unwrap();
        assert!(matches!(
            service.start().await,
            Err(CollectorError::AlreadyStarted)
        ));
        service.stop().await.unwrap();
    }

    #[tokio::test]
    async fn source_exhaustion_stops_the_service() {
        let dir = tempdir().unwrap();
        let recorder = Arc::new(CsvSpreadRecorder::new(dir.path()));
        let source = Arc::new(ScriptedSource::new(
            vec![update("EURUSD", "2025-11-18T12:00:00Z", 1.0864, 1.0866)],
            false,
        ));
        let closed = source.closed.clone();
        let service = CollectorService::new(
            source,
            test_instruments(),
            recorder,
            Duration::from_secs(3600),
        );
        service.start().await.unwrap();
        timeout(Duration::from_secs(2), service.wait_stopped())
            .await
            .expect("service stops itself when the queue closes");

        let lines = read_lines(dir.path(), "20251118/EURUSD_12.csv");
        assert_eq!(lines.len(), 2);
        assert!(closed.load(Ordering::SeqCst));
        assert!(matches!(
            service.stop().await,
            Err(CollectorError::NotRunning)
        ));
    }

    #[tokio::test]
    async fn declared_token_refresh_sees_connect_and_cancel() {
        let dir = tempdir().unwrap();
        let recorder = Arc::new(CsvSpreadRecorder::new(dir.path()));
        let connected_seen = Arc::new(AtomicBool::new(false));
        let cancelled_seen = Arc::new(AtomicBool::new(false));
        let mut source = ScriptedSource::new(Vec::new(), true);
        source.refresh = Some(Arc::new(RefreshProbe {
            connected_seen: connected_seen.clone(),
            cancelled_seen: cancelled_seen.clone(),
        }));
        let service = CollectorService::new(
            Arc::new(source),
            test_instruments(),
            recorder,
            Duration::from_secs(3600),
        );
        service.start().await.unwrap();
        sleep(Duration::from_millis(100)).await;
        assert!(connected_seen.load(Ordering::SeqCst));
        assert!(!cancelled_seen.load(Ordering::SeqCst));
        service.stop().await.unwrap();
        assert!(cancelled_seen.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn periodic_flush_makes_rows_durable_without_stop() {
        let dir = tempdir().unwrap();
        let recorder = Arc::new(CsvSpreadRecorder::new(dir.path()));
        let source = Arc::new(ScriptedSource::new(
            vec![update("EURUSD", "2025-11-18T12:00:00Z", 1.0864, 1.0866)],
            true,
        ));
        let service = CollectorService::new(
            source,
            test_instruments(),
            recorder,
            Duration::from_millis(50),
        );
        service.start().await.unwrap();
        sleep(Duration::from_millis(300)).await;
        // No stop yet; the interval flush alone must have written the row.
        let lines = read_lines(dir.path(), "20251118/EURUSD_12.csv");
        assert_eq!(lines.len(), 2);
        service.stop().await.unwrap();
    }
}
