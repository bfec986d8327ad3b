// Copyright (c) James Kassemi, SC, US. All rights reserved.

//! Spread collector entry point: wires configuration, the instrument table,
//! the CSV recorder, and a replay price source, then waits for ctrl-c or
//! source exhaustion.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use collector_service::CollectorService;
use core_types::{load_instruments, AppConfig};
use log::{error, info};
use replay_source::ReplaySource;
use spread_recorder::CsvSpreadRecorder;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init();
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("collector error: {}", err);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load()?;
    info!("loading instruments from {}", config.instruments_path);
    let instruments = load_instruments(&config.instruments_path)?;
    info!("loaded {} instruments", instruments.len());

    let recorder = Arc::new(CsvSpreadRecorder::new(&config.recording.base_dir));
    let source = Arc::new(ReplaySource::new(&config.replay.path, config.replay.delay()));
    let service = CollectorService::new(
        source,
        instruments,
        recorder,
        config.recording.flush_interval(),
    );
    service.start().await?;
    info!("collector running (ctrl-c to stop)");

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            info!("shutdown signal received");
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, service.stop()).await {
                Ok(Ok(())) => info!("shutdown complete"),
                Ok(Err(err)) => info!("shutdown already underway: {}", err),
                Err(_) => return Err("shutdown timeout exceeded".into()),
            }
        }
        _ = service.cancelled() => {
            info!("price source exhausted; waiting for the collector to settle");
            service.wait_stopped().await;
        }
    }
    Ok(())
}
