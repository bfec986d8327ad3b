use spread_recorder::RecorderError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("collector already started")]
    AlreadyStarted,
    #[error("collector is not running")]
    NotRunning,
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("price subscription failed: {0}")]
    Subscribe(String),
    #[error("instrument not found: {0}")]
    UnknownInstrument(String),
    #[error("recorder error: {0}")]
    Recorder(#[from] RecorderError),
}
