// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::path::PathBuf;

use chrono::SecondsFormat;
use core_types::PriceData;
use log::{info, warn};
use parking_lot::Mutex;

use crate::error::RecorderError;
use crate::partition::PartitionKey;

const HEADER: [&str; 7] = [
    "timestamp",
    "uic",
    "ticker",
    "asset_type",
    "bid",
    "ask",
    "spread",
];

/// Storage port for spread observations.
pub trait SpreadRecorder: Send + Sync {
    /// Appends a single observation.
    fn record(&self, data: &PriceData) -> Result<(), RecorderError>;

    /// Appends a batch under a single lock acquisition. Elements are written
    /// in input order; on failure the error names the failing partition and
    /// earlier appends stand (append-only, partial success is defined
    /// behavior).
    fn record_batch(&self, data: &[PriceData]) -> Result<(), RecorderError>;

    /// Forces buffered rows of every open partition to disk. Keeps going
    /// past per-partition failures and returns the first error seen.
    fn flush(&self) -> Result<(), RecorderError>;

    /// Flushes and releases every open partition. Called once, during
    /// orchestrated shutdown.
    fn close(&self) -> Result<(), RecorderError>;
}

struct OpenPartition {
    writer: csv::Writer<File>,
}

/// CSV-file recorder writing `<base>/<YYYYMMDD>/<TICKER>_<HH>.csv`.
///
/// Hourly files keep the per-day file count manageable, and rotation on
/// resolve bounds open handles to one per ticker regardless of run length.
pub struct CsvSpreadRecorder {
    base_dir: PathBuf,
    partitions: Mutex<HashMap<PartitionKey, OpenPartition>>,
}

impl CsvSpreadRecorder {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            partitions: Mutex::new(HashMap::new()),
        }
    }

    /// Number of currently open partitions (observability and tests).
    pub fn open_partitions(&self) -> usize {
        self.partitions.lock().len()
    }

    /// Returns the open partition for `key`, opening it first if needed.
    /// Opening a new hour for a ticker evicts that ticker's previous hour
    /// before the new file is touched.
    fn resolve<'a>(
        &self,
        partitions: &'a mut HashMap<PartitionKey, OpenPartition>,
        key: &PartitionKey,
    ) -> Result<&'a mut OpenPartition, RecorderError> {
        if !partitions.contains_key(key) {
            rotate_out(partitions, key);
            let partition = self.open_partition(key)?;
            partitions.insert(key.clone(), partition);
        }
        Ok(partitions.get_mut(key).expect("partition registered above"))
    }

    fn open_partition(&self, key: &PartitionKey) -> Result<OpenPartition, RecorderError> {
        let dir = self.base_dir.join(key.dir_name());
        std::fs::create_dir_all(&dir).map_err(|source| RecorderError::CreateDir {
            key: key.clone(),
            path: dir.clone(),
            source,
        })?;
        let path = dir.join(key.file_name());
        let existed = path.exists();
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|source| RecorderError::OpenFile {
                key: key.clone(),
                path: path.clone(),
                source,
            })?;
        let mut writer = csv::Writer::from_writer(file);
        if !existed {
            writer
                .write_record(HEADER)
                .map_err(|source| RecorderError::WriteHeader {
                    key: key.clone(),
                    source,
                })?;
        }
        info!("opened partition {} at {}", key, path.display());
        Ok(OpenPartition { writer })
    }
}

/// Flushes and drops every open partition sharing `key`'s ticker from a
/// different hour. Best-effort: errors are logged and never fail the
/// resolve that triggered the rotation.
fn rotate_out(partitions: &mut HashMap<PartitionKey, OpenPartition>, key: &PartitionKey) {
    let stale: Vec<PartitionKey> = partitions
        .keys()
        .filter(|open| open.ticker == key.ticker && *open != key)
        .cloned()
        .collect();
    for old_key in stale {
        if let Some(mut partition) = partitions.remove(&old_key) {
            if let Err(err) = partition.writer.flush() {
                warn!("error flushing superseded partition {}: {}", old_key, err);
            }
            info!("closed hourly partition {}", old_key);
        }
    }
}

fn append_row(
    partition: &mut OpenPartition,
    key: &PartitionKey,
    data: &PriceData,
) -> Result<(), RecorderError> {
    let bid = round_price(data.bid, data.decimals);
    let ask = round_price(data.ask, data.decimals);
    let spread = round_price(data.spread, data.decimals);
    let row = [
        data.timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true),
        data.uic.to_string(),
        data.ticker.clone(),
        data.asset_type.clone(),
        format_price(bid, data.decimals),
        format_price(ask, data.decimals),
        format_price(spread, data.decimals),
    ];
    partition
        .writer
        .write_record(&row)
        .map_err(|source| RecorderError::WriteRecord {
            key: key.clone(),
            source,
        })
}

/// Rounds half away from zero at `decimals` places. Non-positive `decimals`
/// leaves the raw streamed value untouched.
fn round_price(price: f64, decimals: i32) -> f64 {
    if decimals <= 0 {
        return price;
    }
    let factor = 10f64.powi(decimals);
    (price * factor).round() / factor
}

fn format_price(price: f64, decimals: i32) -> String {
    if decimals <= 0 {
        price.to_string()
    } else {
        format!("{:.*}", decimals as usize, price)
    }
}

impl SpreadRecorder for CsvSpreadRecorder {
    fn record(&self, data: &PriceData) -> Result<(), RecorderError> {
        let mut partitions = self.partitions.lock();
        let key = PartitionKey::new(&data.ticker, data.timestamp);
        let partition = self.resolve(&mut partitions, &key)?;
        append_row(partition, &key, data)
    }

    fn record_batch(&self, data: &[PriceData]) -> Result<(), RecorderError> {
        let mut partitions = self.partitions.lock();
        for item in data {
            let key = PartitionKey::new(&item.ticker, item.timestamp);
            let partition = self.resolve(&mut partitions, &key)?;
            append_row(partition, &key, item)?;
        }
        Ok(())
    }

    fn flush(&self) -> Result<(), RecorderError> {
        let mut partitions = self.partitions.lock();
        let mut first_err = None;
        for (key, partition) in partitions.iter_mut() {
            if let Err(source) = partition.writer.flush() {
                warn!("error flushing partition {}: {}", key, source);
                if first_err.is_none() {
                    first_err = Some(RecorderError::Flush {
                        key: key.clone(),
                        source,
                    });
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn close(&self) -> Result<(), RecorderError> {
        let mut partitions = self.partitions.lock();
        let mut first_err = None;
        for (key, mut partition) in partitions.drain() {
            if let Err(source) = partition.writer.flush() {
                warn!("error flushing partition {} during close: {}", key, source);
                if first_err.is_none() {
                    first_err = Some(RecorderError::Flush { key, source });
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
