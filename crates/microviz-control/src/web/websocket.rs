//! WebSocket broadcast of bar frames
//!
//! Each viewer gets its own send loop: read the shared bars, scale them,
//! look up the current track and send one text frame. Cycles start one
//! broadcast interval apart, measured from the start of the previous cycle,
//! so lookup and send time do not stretch the period. Settings are re-read
//! every cycle so interval and bar count changes apply to connected viewers
//! without reconnecting.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use microviz_core::SpectrumState;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::Instant;

use super::server::AppState;
use crate::metadata::{MetadataProvider, NowPlaying};

/// One frame as sent to viewers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumFrame {
    /// Bars scaled to 0..=100
    pub fft: Vec<f32>,
    pub title: String,
    pub artist: String,
}

/// Snapshot the shared bars and current track into a frame
pub async fn build_frame(spectrum: &SpectrumState, metadata: &MetadataProvider) -> SpectrumFrame {
    let fft = spectrum.display_bars();
    let NowPlaying { title, artist } = metadata.current_track().await;
    SpectrumFrame { fft, title, artist }
}

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    tracing::info!("Viewer connected");

    let mut send_task = tokio::spawn(async move {
        loop {
            let cycle_start = Instant::now();
            let frame = build_frame(&state.spectrum, &state.metadata).await;

            let json = match serde_json::to_string(&frame) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!("Failed to encode frame: {}", e);
                    break;
                }
            };

            if let Err(e) = sender.send(Message::Text(json)).await {
                tracing::debug!("Send to viewer failed: {}", e);
                break;
            }

            let interval = send_interval(state.settings.snapshot().send_interval);
            tokio::time::sleep_until(next_cycle(cycle_start, interval)).await;
        }
    });

    // Inbound messages carry no meaning; only watch for the peer going away
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => break,
                Err(e) => {
                    tracing::debug!("WebSocket receive error: {}", e);
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    tracing::info!("Viewer disconnected");
}

fn send_interval(seconds: f64) -> Duration {
    Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
}

/// Deadline of the next cycle; an overrun cycle starts the next one at once
fn next_cycle(cycle_start: Instant, interval: Duration) -> Instant {
    cycle_start
        .checked_add(interval)
        .unwrap_or_else(|| Instant::now() + Duration::from_secs(86400 * 365))
}
