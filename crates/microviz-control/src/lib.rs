//! MicroViz Control - Network surfaces of the visualizer
//!
//! This crate exposes the audio pipeline to the outside world:
//! - **Settings API**: `GET`/`POST /settings` plus the static viewer files
//! - **Stream**: WebSocket frames of scaled bars with the current track
//! - **Metadata**: now-playing lookup over MPRIS, degrading to `"Unknown"`
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use microviz_control::{AppState, MetadataProvider, StreamServer, StreamServerConfig};
//! use microviz_core::{SettingsStore, SpectrumState};
//! use std::sync::Arc;
//!
//! # async fn run() -> microviz_control::Result<()> {
//! let state = AppState {
//!     settings: Arc::new(SettingsStore::default()),
//!     spectrum: Arc::new(SpectrumState::new(300)),
//!     metadata: MetadataProvider::mpris(),
//! };
//! StreamServer::new(StreamServerConfig::default(), state).run().await
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`web`] - Control server, stream server and their handlers
//! - [`metadata`] - Now-playing lookup
//! - [`error`] - Error types

#![allow(missing_docs)]

/// Error types
pub mod error;
/// Now-playing metadata
pub mod metadata;
/// Web API server
pub mod web;

// Re-exports
pub use error::{ControlError, Result};
pub use metadata::{MetadataProvider, MprisSource, NowPlaying, TrackSource};
pub use web::{
    AppState, SpectrumFrame, StreamServer, StreamServerConfig, WebServer, WebServerConfig,
};
