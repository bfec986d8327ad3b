use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, NaiveDate, Timelike, Utc};

/// Identity of one rotation unit: an instrument's file for one UTC hour.
///
/// Keys are a structured tuple rather than a concatenated string so tickers
/// that are prefixes of one another ("EUR" vs "EURUSD") can never alias
/// during rotation scans.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PartitionKey {
    pub ticker: String,
    pub date: NaiveDate,
    pub hour: u32,
}

impl PartitionKey {
    pub fn new(ticker: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            ticker: ticker.to_string(),
            date: timestamp.date_naive(),
            hour: timestamp.hour(),
        }
    }

    /// `YYYYMMDD` directory under the recorder's base directory.
    pub fn dir_name(&self) -> String {
        self.date.format("%Y%m%d").to_string()
    }

    /// `TICKER_HH.csv` within the date directory.
    pub fn file_name(&self) -> String {
        format!("{}_{:02}.csv", self.ticker, self.hour)
    }

    pub fn relative_path(&self) -> PathBuf {
        PathBuf::from(self.dir_name()).join(self.file_name())
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{:02}",
            self.ticker,
            self.date.format("%Y%m%d"),
            self.hour
        )
    }
}
