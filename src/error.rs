//! Error types for the Sitegate service.

use thiserror::Error;

/// Main error type for Sitegate operations.
///
/// Admission evaluation itself never fails; every variant here surfaces while
/// loading configuration or running the HTTP listener.
#[derive(Error, Debug)]
pub enum SitegateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP server errors
    #[error("Server error: {0}")]
    Server(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for SitegateError {
    fn from(err: config::ConfigError) -> Self {
        SitegateError::Config(err.to_string())
    }
}

/// Result type alias for Sitegate operations.
pub type Result<T> = std::result::Result<T, SitegateError>;
