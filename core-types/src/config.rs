use std::time::Duration;

use config::{Config, ConfigError};
use serde::{Deserialize, Serialize};

/// Config structure with the collector's key knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub recording: RecordingConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
    #[serde(default = "default_instruments_path")]
    pub instruments_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingConfig {
    /// Base directory for the hourly spread files.
    #[serde(default = "default_base_dir")]
    pub base_dir: String,
    #[serde(default = "default_flush_interval_s")]
    pub flush_interval_s: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Tick file replayed through the pipeline (`timestamp,ticker,bid,ask`).
    #[serde(default = "default_replay_path")]
    pub path: String,
    /// Fixed pause between replayed rows; zero replays as fast as possible.
    #[serde(default)]
    pub delay_ms: u64,
}

fn default_base_dir() -> String {
    "data/spreads".to_string()
}

fn default_flush_interval_s() -> u64 {
    30
}

fn default_instruments_path() -> String {
    "data/instruments.json".to_string()
}

fn default_replay_path() -> String {
    "data/ticks.csv".to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            recording: RecordingConfig::default(),
            replay: ReplayConfig::default(),
            instruments_path: default_instruments_path(),
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            flush_interval_s: default_flush_interval_s(),
        }
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            path: default_replay_path(),
            delay_ms: 0,
        }
    }
}

impl RecordingConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_s.max(1))
    }
}

impl ReplayConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(config::File::with_name("config.toml").required(false))
            .add_source(config::Environment::with_prefix("COLLECTOR").separator("__"))
            .build()?;
        settings.try_deserialize()
    }
}
