// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Shared domain types, the static instrument table, and configuration for
//! the spread collector.

pub mod config;
pub mod instruments;
pub mod types;

pub use config::{AppConfig, RecordingConfig, ReplayConfig};
pub use instruments::{load_instruments, Instrument, InstrumentError};
pub use types::{PriceData, PriceUpdate};
