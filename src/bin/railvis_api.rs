//! railvis_api - API-only service for Railway Vision
//!
//! This daemon:
//! 1. Loads configuration from `RAILVIS_CONFIG` and `RAILVIS_*` overrides
//! 2. Opens the analysis log and wires the detector backends
//! 3. Serves the HTTP API until Ctrl-C

use anyhow::{Context, Result};
use std::sync::mpsc;

use railway_vision::{api::ApiServer, config::AppConfig};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::load()?;
    let server = ApiServer::from_config(&config)?;
    let api_handle = server.spawn()?;
    log::info!("railway api listening on {}", api_handle.addr);
    log::info!(
        "railvis_api running. serving {} (default mode {})",
        config.db_path,
        config.default_mode
    );

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .context("error setting Ctrl-C handler")?;

    log::info!("railvis_api waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping API server...");
    api_handle.stop()?;

    Ok(())
}
