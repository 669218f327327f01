//! Error types for beacon-core

use thiserror::Error;

/// Main error type for the beacon-core library
#[derive(Error, Debug)]
pub enum Error {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Persistence backend error
    #[error("storage error: {0}")]
    Storage(String),

    /// A plugin handler or load hook failed
    #[error("plugin {plugin} failed: {message}")]
    Plugin { plugin: String, message: String },
}

/// Result type alias for beacon-core
pub type Result<T> = std::result::Result<T, Error>;
