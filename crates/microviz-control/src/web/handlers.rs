//! HTTP response bodies

use microviz_core::Settings;
use serde::{Deserialize, Serialize};

/// Body of a successful `POST /settings`
#[derive(Debug, Serialize, Deserialize)]
pub struct SettingsUpdated {
    pub status: String,
    pub settings: Settings,
}

impl SettingsUpdated {
    pub fn new(settings: Settings) -> Self {
        Self {
            status: "updated".to_string(),
            settings,
        }
    }
}

/// Body of a rejected request
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
