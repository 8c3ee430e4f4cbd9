//! Error types for the audio pipeline
use thiserror::Error;

/// Rejected configuration updates
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SettingsError {
    /// Request body was not a JSON object
    #[error("settings update must be a JSON object")]
    NotAnObject,

    /// Value could not be converted to the field's type
    #[error("invalid value for {field}: expected {expected}, got {found}")]
    Coercion {
        /// Wire name of the field
        field: &'static str,
        /// Accepted kind of value
        expected: &'static str,
        /// The rejected value as JSON
        found: String,
    },

    /// Value converted but is outside the field's range
    #[error("{field} out of range: {reason}")]
    OutOfRange {
        /// Wire name of the field
        field: &'static str,
        /// Allowed range
        reason: &'static str,
    },
}

/// Audio device errors
#[derive(Error, Debug)]
pub enum AudioError {
    /// No input device available (or the configured one is missing)
    #[error("no audio input device found{}", .0.as_ref().map(|n| format!(": {}", n)).unwrap_or_default())]
    NoInputDevice(Option<String>),

    /// Device enumeration failed
    #[error("failed to enumerate audio devices: {0}")]
    DeviceEnumeration(String),

    /// The device reports no usable input configuration
    #[error("no supported input configuration: {0}")]
    NoSupportedConfig(String),

    /// Sample format the driver does not convert
    #[error("unsupported sample format: {0}")]
    UnsupportedFormat(String),

    /// Building the input stream failed
    #[error("failed to open input stream: {0}")]
    StreamCreation(String),

    /// Starting the input stream failed
    #[error("failed to start input stream: {0}")]
    StreamStart(String),

    /// The capture thread exited unexpectedly
    #[error("capture thread terminated: {0}")]
    ThreadTerminated(String),
}

/// Result type for settings operations
pub type Result<T> = std::result::Result<T, SettingsError>;
