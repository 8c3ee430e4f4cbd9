//! Audio pipeline: capture, spectrum processing and the shared bar state

pub mod capture;
pub mod spectrum;
pub mod state;

pub use capture::{CaptureConfig, CaptureCycle};
#[cfg(feature = "audio")]
pub use capture::CaptureDriver;
pub use spectrum::{SpectrumConfig, SpectrumProcessor};
pub use state::{scale_for_display, SpectrumState, DISPLAY_SCALE};
