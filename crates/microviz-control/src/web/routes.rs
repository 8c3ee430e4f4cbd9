//! Control API route definitions

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use microviz_core::Settings;
use serde_json::Value;

use super::handlers::{ErrorResponse, SettingsUpdated};
use super::server::AppState;

type Rejection = (StatusCode, Json<ErrorResponse>);

/// Build the control API router
pub fn build_router() -> Router<AppState> {
    Router::new().route("/settings", get(get_settings).post(update_settings))
}

/// GET /settings - Current pipeline settings
async fn get_settings(State(state): State<AppState>) -> Json<Settings> {
    Json(state.settings.snapshot())
}

/// POST /settings - Apply a partial update
///
/// The body is parsed by hand so that malformed JSON gets the same
/// `{"error": ...}` 400 as a bad value.
async fn update_settings(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SettingsUpdated>, Rejection> {
    let patch: Value = serde_json::from_slice(&body)
        .map_err(|e| bad_request(format!("Invalid JSON: {}", e)))?;

    match state.settings.update(&patch) {
        Ok(settings) => Ok(Json(SettingsUpdated::new(settings))),
        Err(e) => {
            tracing::warn!("Rejected settings update {}: {}", patch, e);
            Err(bad_request(e.to_string()))
        }
    }
}

fn bad_request(message: String) -> Rejection {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(message)))
}
