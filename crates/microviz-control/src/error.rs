//! Error types for the control and streaming surfaces
use thiserror::Error;

/// Control system errors
#[derive(Error, Debug)]
pub enum ControlError {
    /// HTTP/WebSocket server error
    #[error("HTTP error: {0}")]
    HttpError(String),

    /// I/O error
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Rejected settings update
    #[error("Invalid settings: {0}")]
    Settings(#[from] microviz_core::SettingsError),

    /// Now-playing lookup failed
    #[error("Metadata error: {0}")]
    Metadata(String),
}

/// Result type for control operations
pub type Result<T> = std::result::Result<T, ControlError>;
