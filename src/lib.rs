//! Coinbase level2 market-data recorder
//!
//! Core library for lossless capture of per-level order book deltas into
//! hourly memory-mapped columnar files.

pub mod core;
pub mod feed;
pub mod infrastructure;
pub mod parsing;
pub mod writer;

// Re-export commonly used types
pub use infrastructure::config::Config;

use thiserror::Error;

/// Main error type for the recorder
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, RecorderError>;
