//! Application configuration file
//!
//! ```toml
//! [log]
//! level = "debug"
//!
//! [control]
//! port = 8080
//! static_dir = "static"
//!
//! [stream]
//! port = 43374
//!
//! [pipeline]
//! NUM_BARS = 128
//! SMOOTHING = 0.6
//!
//! [audio]
//! device = "pulse"
//!
//! [metadata]
//! enabled = true
//! timeout_ms = 250
//! ```
//!
//! Every section and key is optional.

use anyhow::{Context, Result};
use microviz_control::{MetadataProvider, MprisSource, StreamServerConfig, WebServerConfig};
use microviz_core::{CaptureConfig, LogConfig, Settings};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the config file
pub const CONFIG_ENV: &str = "MICROVIZ_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub log: LogConfig,
    pub control: WebServerConfig,
    pub stream: StreamServerConfig,
    /// Initial pipeline settings
    pub pipeline: Settings,
    pub audio: CaptureConfig,
    pub metadata: MetadataConfig,
}

/// Now-playing lookup
///
/// Each viewer looks the track up once per frame, which costs one `busctl`
/// process while the same player keeps answering and two after it changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    pub enabled: bool,
    /// `busctl` executable
    pub program: String,
    pub timeout_ms: u64,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "busctl".to_string(),
            timeout_ms: 250,
        }
    }
}

impl MetadataConfig {
    pub fn provider(&self) -> MetadataProvider {
        if !self.enabled {
            return MetadataProvider::disabled();
        }
        MetadataProvider::new(
            MprisSource::default()
                .with_program(self.program.clone())
                .with_timeout(Duration::from_millis(self.timeout_ms)),
        )
    }
}

impl AppConfig {
    /// Parse and validate a TOML document
    pub fn parse(text: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(text).context("Invalid config file")?;
        config
            .pipeline
            .validate()
            .context("Invalid [pipeline] settings")?;
        Ok(config)
    }

    /// Load from a file
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        Self::parse(&text).with_context(|| format!("Failed to load {:?}", path))
    }

    /// Load from the given path, or defaults when there is none
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

/// First CLI argument wins over the environment variable
pub fn resolve_path(arg: Option<String>, env: Option<String>) -> Option<PathBuf> {
    arg.or(env)
        .filter(|p| !p.is_empty())
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = AppConfig::parse("").unwrap();
        assert_eq!(config.pipeline, Settings::default());
        assert_eq!(config.control.port, 8080);
        assert_eq!(config.stream.port, 43374);
        assert_eq!(config.log.level, "info");
        assert!(config.audio.device.is_none());
        assert!(config.metadata.enabled);
    }

    #[test]
    fn test_sections_override_defaults() {
        let config = AppConfig::parse(
            r#"
            [log]
            level = "debug"

            [control]
            host = "0.0.0.0"
            port = 9000
            static_dir = "/srv/microviz"

            [stream]
            port = 9001

            [pipeline]
            NUM_BARS = 64
            SMOOTHING = 0.5
            SAMPLE_RATE = 48000

            [audio]
            device = "pulse"

            [metadata]
            enabled = false
            "#,
        )
        .unwrap();

        assert_eq!(config.log.level, "debug");
        assert_eq!(config.control.host, "0.0.0.0");
        assert_eq!(config.control.port, 9000);
        assert_eq!(config.control.static_dir, PathBuf::from("/srv/microviz"));
        assert_eq!(config.stream.port, 9001);
        assert_eq!(config.pipeline.num_bars, 64);
        assert_eq!(config.pipeline.smoothing, 0.5);
        assert_eq!(config.pipeline.sample_rate, 48000);
        assert_eq!(config.pipeline.fft_size, 1024);
        assert_eq!(config.audio.device.as_deref(), Some("pulse"));
        assert!(!config.metadata.enabled);
    }

    #[test]
    fn test_invalid_pipeline_rejected() {
        assert!(AppConfig::parse("[pipeline]\nNUM_BARS = 0\n").is_err());
        assert!(AppConfig::parse("[pipeline]\nSMOOTHING = 1.5\n").is_err());
    }

    #[test]
    fn test_malformed_toml_rejected() {
        assert!(AppConfig::parse("[control\nport = 1").is_err());
        assert!(AppConfig::parse("[control]\nport = \"eighty\"").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("microviz.toml");
        std::fs::write(&path, "[stream]\nport = 5000\n").unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.stream.port, 5000);

        assert!(AppConfig::load(&dir.path().join("missing.toml")).is_err());
        assert_eq!(
            AppConfig::load_or_default(None).unwrap().stream.port,
            43374
        );
    }

    #[test]
    fn test_resolve_path_precedence() {
        assert_eq!(
            resolve_path(Some("a.toml".into()), Some("b.toml".into())),
            Some(PathBuf::from("a.toml"))
        );
        assert_eq!(
            resolve_path(None, Some("b.toml".into())),
            Some(PathBuf::from("b.toml"))
        );
        assert_eq!(resolve_path(None, Some(String::new())), None);
        assert_eq!(resolve_path(None, None), None);
    }
}
