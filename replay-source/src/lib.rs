// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! CSV tick replay implementing [`PriceSource`] for local runs and
//! end-to-end tests.
//!
//! Rows are `timestamp,ticker,bid,ask` with RFC 3339 timestamps, no header.
//! The reader task closes the queue at end of input, which the collector
//! observes as source exhaustion.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use collector_service::{BoxError, PriceSource};
use core_types::PriceUpdate;
use csv_async::AsyncReaderBuilder;
use futures::StreamExt;
use log::{info, warn};
use tokio::fs::File;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tokio::time::sleep;

const QUEUE_DEPTH: usize = 256;

pub struct ReplaySource {
    path: PathBuf,
    delay: Duration,
}

impl ReplaySource {
    pub fn new(path: impl Into<PathBuf>, delay: Duration) -> Self {
        Self {
            path: path.into(),
            delay,
        }
    }
}

#[async_trait]
impl PriceSource for ReplaySource {
    async fn connect(&self) -> Result<(), BoxError> {
        // Nothing to authenticate; just verify the input up front.
        tokio::fs::metadata(&self.path)
            .await
            .map_err(|err| format!("replay input {} not readable: {}", self.path.display(), err))?;
        Ok(())
    }

    async fn subscribe(
        &self,
        tickers: &[String],
    ) -> Result<mpsc::Receiver<PriceUpdate>, BoxError> {
        let file = File::open(&self.path)
            .await
            .map_err(|err| format!("failed to open {}: {}", self.path.display(), err))?;
        let wanted: HashSet<String> = tickers.iter().cloned().collect();
        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        let delay = self.delay;
        let path = self.path.clone();
        tokio::spawn(async move {
            let buf = BufReader::new(file);
            let mut reader = AsyncReaderBuilder::new()
                .has_headers(false)
                .create_reader(buf);
            let mut records = reader.records();
            let mut replayed = 0u64;
            while let Some(record) = records.next().await {
                let record = match record {
                    Ok(record) => record,
                    Err(err) => {
                        warn!("replay row error in {}: {}", path.display(), err);
                        continue;
                    }
                };
                let Some(update) = parse_tick_row(&record) else {
                    warn!("skipping malformed replay row in {}", path.display());
                    continue;
                };
                if !wanted.is_empty() && !wanted.contains(&update.ticker) {
                    continue;
                }
                if tx.send(update).await.is_err() {
                    // Receiver dropped; the collector is shutting down.
                    return;
                }
                replayed += 1;
                if !delay.is_zero() {
                    sleep(delay).await;
                }
            }
            info!("replay of {} finished ({} updates)", path.display(), replayed);
        });
        Ok(rx)
    }

    async fn close(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

fn parse_tick_row(record: &csv_async::StringRecord) -> Option<PriceUpdate> {
    let timestamp: DateTime<Utc> = record.get(0)?.parse().ok()?;
    let ticker = record.get(1)?.trim().to_string();
    if ticker.is_empty() {
        return None;
    }
    let bid: f64 = record.get(2)?.parse().ok()?;
    let ask: f64 = record.get(3)?.parse().ok()?;
    Some(PriceUpdate {
        ticker,
        timestamp,
        bid,
        ask,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SAMPLE: &str = "2025-11-18T12:00:00Z,EURUSD,1.0864,1.0865\n\
                          not-a-timestamp,EURUSD,1,2\n\
                          2025-11-18T12:00:01Z,USDJPY,155.12,155.15\n";

    #[tokio::test]
    async fn replays_rows_and_closes_the_queue() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ticks.csv");
        std::fs::write(&path, SAMPLE).unwrap();
        let source = ReplaySource::new(&path, Duration::ZERO);
        source.connect().await.unwrap();
        let mut rx = source
            .subscribe(&["EURUSD".to_string(), "USDJPY".to_string()])
            .await
            .unwrap();
        let first = rx.recv().await.unwrap();
        assert_eq!(first.ticker, "EURUSD");
        assert!((first.bid - 1.0864).abs() < 1e-9);
        assert!((first.ask - 1.0865).abs() < 1e-9);
        // The malformed middle row is skipped, not fatal.
        let second = rx.recv().await.unwrap();
        assert_eq!(second.ticker, "USDJPY");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn filters_to_subscribed_tickers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ticks.csv");
        std::fs::write(&path, SAMPLE).unwrap();
        let source = ReplaySource::new(&path, Duration::ZERO);
        let mut rx = source.subscribe(&["USDJPY".to_string()]).await.unwrap();
        let only = rx.recv().await.unwrap();
        assert_eq!(only.ticker, "USDJPY");
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn connect_rejects_missing_input() {
        let source = ReplaySource::new("does/not/exist.csv", Duration::ZERO);
        assert!(source.connect().await.is_err());
    }
}
