// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Hourly-partitioned CSV persistence for bid/ask spread observations.
//!
//! The crate exposes:
//! - [`SpreadRecorder`]: the storage port consumed by the collector service.
//! - [`CsvSpreadRecorder`]: append-only CSV files, one per instrument per
//!   UTC hour, with at most one open file per instrument at any time.

mod error;
mod partition;
mod recorder;

pub use error::RecorderError;
pub use partition::PartitionKey;
pub use recorder::{CsvSpreadRecorder, SpreadRecorder};
