//! MicroViz - capture audio, stream spectrum bars to browsers

mod config;
mod logging_setup;

use anyhow::{bail, Context, Result};
use microviz_control::{AppState, StreamServer, WebServer};
use microviz_core::{CaptureDriver, SettingsStore, SpectrumState};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{error, info};

use crate::config::{resolve_path, AppConfig, CONFIG_ENV};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = resolve_path(std::env::args().nth(1), std::env::var(CONFIG_ENV).ok());
    let config = AppConfig::load_or_default(config_path.as_deref())?;

    let _log_guard = logging_setup::init(&config.log)?;

    info!("==========================================");
    info!("===      MicroViz Session Started      ===");
    info!("==========================================");
    match &config_path {
        Some(path) => info!("Configuration loaded from {:?}", path),
        None => info!("No configuration file, using defaults"),
    }

    if let Err(e) = run(config).await {
        error!("{:#}", e);
        return Err(e);
    }
    Ok(())
}

async fn run(config: AppConfig) -> Result<()> {
    let settings =
        Arc::new(SettingsStore::new(config.pipeline).context("Invalid pipeline settings")?);
    let initial = settings.snapshot();
    info!(
        "Pipeline: {} Hz, block {}, FFT {}, {} bars, smoothing {}, interval {}s",
        initial.sample_rate,
        initial.block_size,
        initial.fft_size,
        initial.num_bars,
        initial.smoothing,
        initial.send_interval
    );

    let spectrum = Arc::new(SpectrumState::new(initial.num_bars));

    let capture = CaptureDriver::spawn(config.audio.clone(), settings.clone(), spectrum.clone())
        .context("Failed to start audio capture")?;
    info!(
        "Audio capture started on {}",
        config.audio.device.as_deref().unwrap_or("default input device")
    );

    // The driver only reports through a blocking receiver
    let (capture_tx, capture_rx) = oneshot::channel();
    std::thread::Builder::new()
        .name("capture-watch".to_string())
        .spawn(move || {
            let _ = capture_tx.send(capture.wait_fatal());
        })
        .context("Failed to spawn capture watcher")?;

    let state = AppState {
        settings,
        spectrum,
        metadata: config.metadata.provider(),
    };

    let control = WebServer::new(config.control.clone(), state.clone()).spawn();
    let stream = StreamServer::new(config.stream.clone(), state).spawn();

    info!(
        "Settings API: http://{}:{}/settings",
        config.control.host, config.control.port
    );
    info!(
        "Spectrum stream: ws://{}:{}/ws",
        config.stream.host, config.stream.port
    );

    tokio::select! {
        result = control => {
            result.context("Control server task failed")?.context("Control server stopped")?;
            bail!("Control server exited");
        }
        result = stream => {
            result.context("Stream server task failed")?.context("Stream server stopped")?;
            bail!("Stream server exited");
        }
        failure = capture_rx => {
            match failure {
                Ok(Some(e)) => return Err(e).context("Audio capture failed"),
                _ => bail!("Audio capture stopped"),
            }
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            info!("Interrupted, shutting down");
        }
    }

    Ok(())
}
