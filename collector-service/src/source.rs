// Copyright (c) James Kassemi, SC, US. All rights reserved.

use std::sync::Arc;

use async_trait::async_trait;
use core_types::PriceUpdate;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Upstream feed of price updates.
///
/// Implementations own connection setup and teardown. The collector only
/// consumes the subscribed queue; the sender side closing the channel is the
/// signal that the upstream has ended.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Establishes (and authenticates) the upstream connection.
    async fn connect(&self) -> Result<(), BoxError>;

    /// Subscribes to price updates for `tickers` and returns the inbound
    /// queue.
    async fn subscribe(&self, tickers: &[String])
        -> Result<mpsc::Receiver<PriceUpdate>, BoxError>;

    /// Releases the upstream connection.
    async fn close(&self) -> Result<(), BoxError>;

    /// Early token refresh, if the producer supports it. The capability is
    /// declared up front rather than discovered at runtime.
    fn token_refresh(&self) -> Option<Arc<dyn TokenRefresh>> {
        None
    }
}

/// Optional producer capability: keeps upstream credentials fresh across a
/// long-lived session.
#[async_trait]
pub trait TokenRefresh: Send + Sync {
    /// Runs until `cancel` fires. `connected` fires once, after the
    /// producer connection has been established.
    async fn run(&self, connected: oneshot::Receiver<()>, cancel: CancellationToken);
}
