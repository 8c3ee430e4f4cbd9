//! MicroViz Core - Audio spectrum pipeline
//!
//! This crate contains everything between the input device and the data a
//! viewer receives:
//! - Runtime-tunable settings with typed coercion and validation
//! - The spectrum processor (FFT, normalization, resampling, smoothing)
//! - The shared bar vector crossing the capture/broadcast boundary
//! - The capture driver (requires the `audio` feature)
//! - Logging configuration
//!
//! ## Feature Flags
//!
//! - `audio`: cpal-backed capture driver (default)

#![warn(missing_docs)]

pub mod audio;
/// Error types
pub mod error;
pub mod logging;
pub mod settings;

pub use audio::{
    CaptureConfig, CaptureCycle, SpectrumConfig, SpectrumProcessor, SpectrumState, DISPLAY_SCALE,
};
#[cfg(feature = "audio")]
pub use audio::CaptureDriver;
pub use error::{AudioError, SettingsError};
pub use logging::LogConfig;
pub use settings::{DeviceParams, Settings, SettingsStore};
