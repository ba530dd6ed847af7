//! Error types for the Storeguard service.

use thiserror::Error;

/// Main error type for Storeguard operations.
#[derive(Error, Debug)]
pub enum StoreguardError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed input to a promo-code mutation
    #[error("Validation error: {0}")]
    Validation(String),

    /// gRPC server errors
    #[error("gRPC error: {0}")]
    Grpc(#[from] tonic::transport::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding errors (redemption audit log)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML decoding errors (promo catalog)
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl StoreguardError {
    /// Shorthand for a [`StoreguardError::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        StoreguardError::Validation(message.into())
    }
}

impl From<config::ConfigError> for StoreguardError {
    fn from(err: config::ConfigError) -> Self {
        StoreguardError::Config(err.to_string())
    }
}

/// Result type alias for Storeguard operations.
pub type Result<T> = std::result::Result<T, StoreguardError>;
