//! Logging configuration
//!
//! Holds what the binary needs to build its `tracing` subscriber: the level,
//! which outputs are enabled and where log files go.

use chrono::Local;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing::level_filters::LevelFilter;

const LOG_FILE_PREFIX: &str = "microviz_";
const LOG_FILE_EXTENSION: &str = "log";

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default level (trace, debug, info, warn, error); `RUST_LOG` overrides it
    pub level: String,
    /// Write to stderr
    pub console_output: bool,
    /// Write to a daily file in `log_dir`
    pub file_output: bool,
    /// Directory for log files
    pub log_dir: PathBuf,
    /// Number of log files kept; older ones are removed at startup
    pub max_files: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console_output: true,
            file_output: false,
            log_dir: default_log_dir(),
            max_files: 10,
        }
    }
}

fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("microviz").join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

impl LogConfig {
    /// Configured level, INFO if it does not parse
    pub fn parse_level(&self) -> LevelFilter {
        self.level.parse().unwrap_or(LevelFilter::INFO)
    }

    /// Log file for today
    pub fn current_log_path(&self) -> PathBuf {
        self.log_dir.join(format!(
            "{}{}.{}",
            LOG_FILE_PREFIX,
            Local::now().format("%Y-%m-%d"),
            LOG_FILE_EXTENSION
        ))
    }

    /// Create the log directory if needed
    pub fn ensure_log_directory(&self) -> io::Result<()> {
        fs::create_dir_all(&self.log_dir)
    }

    /// Remove the oldest log files beyond `max_files`, returning how many were removed
    pub fn cleanup_old_logs(&self) -> io::Result<usize> {
        if !self.log_dir.exists() {
            return Ok(0);
        }

        let mut logs: Vec<PathBuf> = fs::read_dir(&self.log_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                let is_log = path.extension().and_then(|e| e.to_str()) == Some(LOG_FILE_EXTENSION);
                let ours = path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with(LOG_FILE_PREFIX))
                    .unwrap_or(false);
                is_log && ours
            })
            .collect();

        if logs.len() <= self.max_files {
            return Ok(0);
        }

        // Date-stamped names sort chronologically
        logs.sort();
        let excess = logs.len() - self.max_files;
        for path in &logs[..excess] {
            fs::remove_file(path)?;
        }
        Ok(excess)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_level() {
        let mut config = LogConfig::default();
        assert_eq!(config.parse_level(), LevelFilter::INFO);

        config.level = "debug".to_string();
        assert_eq!(config.parse_level(), LevelFilter::DEBUG);

        config.level = "loud".to_string();
        assert_eq!(config.parse_level(), LevelFilter::INFO);
    }

    #[test]
    fn test_current_log_path() {
        let config = LogConfig {
            log_dir: PathBuf::from("/tmp/microviz-logs"),
            ..Default::default()
        };
        let path = config.current_log_path();
        assert!(path.starts_with("/tmp/microviz-logs"));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("microviz_"));
        assert!(name.ends_with(".log"));
    }

    #[test]
    fn test_cleanup_keeps_newest() {
        let dir = tempfile::tempdir().unwrap();
        let config = LogConfig {
            log_dir: dir.path().to_path_buf(),
            max_files: 2,
            ..Default::default()
        };

        for day in ["2024-01-01", "2024-01-02", "2024-01-03", "2024-01-04"] {
            fs::write(dir.path().join(format!("microviz_{}.log", day)), "x").unwrap();
        }
        fs::write(dir.path().join("notes.txt"), "keep").unwrap();

        assert_eq!(config.cleanup_old_logs().unwrap(), 2);
        assert!(!dir.path().join("microviz_2024-01-01.log").exists());
        assert!(!dir.path().join("microviz_2024-01-02.log").exists());
        assert!(dir.path().join("microviz_2024-01-04.log").exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_cleanup_missing_dir() {
        let config = LogConfig {
            log_dir: PathBuf::from("/nonexistent/microviz/logs"),
            ..Default::default()
        };
        assert_eq!(config.cleanup_old_logs().unwrap(), 0);
    }
}
