//! HTTP settings API and WebSocket bar stream

pub mod handlers;
pub mod routes;
pub mod server;
pub mod websocket;

pub use server::{AppState, StreamServer, StreamServerConfig, WebServer, WebServerConfig};
pub use websocket::{build_frame, SpectrumFrame};
