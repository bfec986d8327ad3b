// Copyright (c) James Kassemi, SC, US. All rights reserved.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Raw bid/ask update as delivered by a price source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub ticker: String,
    pub timestamp: DateTime<Utc>,
    pub bid: f64,
    pub ask: f64,
}

/// Enriched observation ready for recording.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceData {
    pub timestamp: DateTime<Utc>,
    pub uic: i32,
    pub ticker: String,
    pub asset_type: String,
    pub bid: f64,
    pub ask: f64,
    pub spread: f64,
    /// Fractional digits the instrument is quoted in (4 for EURUSD, 2 for
    /// USDJPY). Non-positive means "record raw values".
    pub decimals: i32,
}

impl PriceData {
    /// Recomputes the spread from the current bid/ask.
    pub fn compute_spread(&mut self) {
        self.spread = self.ask - self.bid;
    }
}
