//! Axum HTTP and WebSocket servers
//!
//! Two listeners share one [`AppState`]: the control server (settings API
//! plus static viewer files) and the stream server (bar frames over
//! WebSocket).

use axum::http::{header, HeaderValue, Method};
use axum::{
    extract::Request,
    middleware::{self, Next},
    response::Response,
    routing::get,
    Router,
};
use microviz_core::{SettingsStore, SpectrumState};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;

use crate::metadata::MetadataProvider;
use crate::{error::ControlError, Result};

use super::routes::build_router;
use super::websocket::ws_handler;

/// Application state shared across all requests
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<SettingsStore>,
    pub spectrum: Arc<SpectrumState>,
    pub metadata: MetadataProvider,
}

/// Control server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebServerConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
    pub allowed_origins: Vec<String>,
    /// Directory served for every path the API does not claim
    pub static_dir: PathBuf,
}

fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}

impl Default for WebServerConfig {
    fn default() -> Self {
        Self {
            // Localhost only unless configured otherwise
            host: "127.0.0.1".to_string(),
            port: 8080,
            enable_cors: true,
            allowed_origins: default_allowed_origins(),
            static_dir: PathBuf::from("."),
        }
    }
}

impl WebServerConfig {
    /// Create a new web server config
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// Set the host address
    pub fn with_host(mut self, host: String) -> Self {
        self.host = host;
        self
    }

    /// Set CORS enabled/disabled
    pub fn with_cors(mut self, enable: bool) -> Self {
        self.enable_cors = enable;
        self
    }

    /// Set allowed origins for CORS
    pub fn with_allowed_origins(mut self, origins: Vec<String>) -> Self {
        self.allowed_origins = origins;
        self
    }

    /// Set the static file directory
    pub fn with_static_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.static_dir = dir.into();
        self
    }
}

/// Stream server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for StreamServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 43374,
        }
    }
}

impl StreamServerConfig {
    pub fn new(port: u16) -> Self {
        Self {
            port,
            ..Default::default()
        }
    }

    /// Set the host address
    pub fn with_host(mut self, host: String) -> Self {
        self.host = host;
        self
    }
}

/// Settings API and static viewer files
pub struct WebServer {
    config: WebServerConfig,
    state: AppState,
}

impl WebServer {
    /// Create a new web server
    pub fn new(config: WebServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Assemble the router without binding a socket
    pub fn router(&self) -> Result<Router> {
        let app = build_router()
            .fallback_service(ServeDir::new(&self.config.static_dir))
            .layer(middleware::from_fn(security_headers))
            .with_state(self.state.clone());

        if !self.config.enable_cors {
            return Ok(app);
        }

        let cors_layer = CorsLayer::new()
            .allow_methods([Method::GET, Method::POST])
            .allow_headers([header::CONTENT_TYPE]);

        // If allowed_origins contains "*" or is empty (default permissive), allow Any
        if self.config.allowed_origins.iter().any(|o| o == "*")
            || self.config.allowed_origins.is_empty()
        {
            Ok(app.layer(cors_layer.allow_origin(Any)))
        } else {
            let origins: Result<Vec<HeaderValue>> = self
                .config
                .allowed_origins
                .iter()
                .map(|o| {
                    o.parse::<HeaderValue>().map_err(|e| {
                        ControlError::HttpError(format!("Invalid origin header: {}", e))
                    })
                })
                .collect();

            Ok(app.layer(cors_layer.allow_origin(origins?)))
        }
    }

    /// Run the web server (blocking)
    pub async fn run(self) -> Result<()> {
        let addr = parse_addr(&self.config.host, self.config.port)?;
        let app = self.router()?;
        tracing::info!(
            "Control server listening on {} (static files from {})",
            addr,
            self.config.static_dir.display()
        );
        serve(addr, app).await
    }

    /// Spawn the server in a background task
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}

/// WebSocket endpoint pushing bar frames
pub struct StreamServer {
    config: StreamServerConfig,
    state: AppState,
}

impl StreamServer {
    pub fn new(config: StreamServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Assemble the router without binding a socket
    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(ws_handler))
            .route("/ws", get(ws_handler))
            .with_state(self.state.clone())
    }

    /// Run the stream server (blocking)
    pub async fn run(self) -> Result<()> {
        let addr = parse_addr(&self.config.host, self.config.port)?;
        let app = self.router();
        tracing::info!("Stream server listening on ws://{}", addr);
        serve(addr, app).await
    }

    /// Spawn the server in a background task
    pub fn spawn(self) -> tokio::task::JoinHandle<Result<()>> {
        tokio::spawn(async move { self.run().await })
    }
}

fn parse_addr(host: &str, port: u16) -> Result<SocketAddr> {
    format!("{}:{}", host, port)
        .parse()
        .map_err(|e| ControlError::HttpError(format!("Invalid address: {}", e)))
}

async fn serve(addr: SocketAddr, app: Router) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ControlError::HttpError(format!("Failed to bind {}: {}", addr, e)))?;

    axum::serve(listener, app.into_make_service())
        .await
        .map_err(|e| ControlError::HttpError(format!("Server error: {}", e)))
}

/// Security headers middleware
async fn security_headers(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    // Prevent MIME sniffing
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );

    // Prevent clickjacking
    headers.insert(header::X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));

    headers.insert(
        header::X_XSS_PROTECTION,
        HeaderValue::from_static("1; mode=block"),
    );

    headers.insert(
        header::REFERRER_POLICY,
        HeaderValue::from_static("no-referrer"),
    );

    response
}
