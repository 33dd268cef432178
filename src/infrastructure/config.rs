//! Configuration management for the recorder
//!
//! Loads configuration from config.toml at startup. Every field has a
//! default so the recorder runs with no file present; the data root falls
//! back to $HOME/hft-data.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::{RecorderError, Result};

/// Recorder configuration
///
/// Loaded from config.toml (path overridable via CONFIG_PATH).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Recording settings
    #[serde(default)]
    pub recorder: RecorderConfig,

    /// Feed connection settings
    #[serde(default)]
    pub feed: FeedConfig,
}

/// Recording settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecorderConfig {
    /// Trading pair to record
    #[serde(default = "default_pair")]
    pub pair: String,

    /// Data root; when unset, $HOME/hft-data (or /tmp/hft-data)
    #[serde(default)]
    pub data_dir: Option<PathBuf>,

    /// fdatasync the header row count every N appends (0 disables)
    #[serde(default)]
    pub fsync_every_rows: u32,
}

/// Feed connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeedConfig {
    /// WebSocket endpoint
    #[serde(default = "default_ws_url")]
    pub ws_url: String,

    /// CPU core for the feed thread (unset disables pinning)
    #[serde(default = "default_pin_core")]
    pub pin_core: Option<usize>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            pair: default_pair(),
            data_dir: None,
            fsync_every_rows: 0,
        }
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            pin_core: default_pin_core(),
        }
    }
}

fn default_pair() -> String {
    "BTC-USD".to_string()
}

fn default_ws_url() -> String {
    "wss://advanced-trade-ws.coinbase.com".to_string()
}

fn default_pin_core() -> Option<usize> {
    Some(0)
}

impl Config {
    /// Load configuration from config.toml.
    ///
    /// If the file doesn't exist, returns the default configuration.
    /// # Errors
    /// Returns error if the file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => {
                toml::from_str(&contents).map_err(|e| RecorderError::Config(e.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Config::default()),
            Err(e) => Err(RecorderError::Io(e)),
        }
    }

    /// Resolved data root: explicit config, else $HOME/hft-data, else
    /// /tmp/hft-data
    pub fn data_dir(&self) -> PathBuf {
        if let Some(dir) = &self.recorder.data_dir {
            return dir.clone();
        }
        match std::env::var_os("HOME") {
            Some(home) => PathBuf::from(home).join("hft-data"),
            None => PathBuf::from("/tmp/hft-data"),
        }
    }
}
