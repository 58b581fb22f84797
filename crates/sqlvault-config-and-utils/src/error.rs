//! Error types shared by configuration, paths and key material.

use thiserror::Error;

/// Error type for configuration and startup utilities.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Path error (e.g., home directory not found)
    #[error("Path error: {0}")]
    Path(String),

    /// Key material could not be parsed, sealed or opened.
    #[error("Key material error: {0}")]
    KeyMaterial(String),

    /// A key file is missing while encrypted databases already exist.
    #[error("Encryption key file {0} is missing but databases already exist in storage")]
    KeyFileMissing(String),
}

/// Result type alias using CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
