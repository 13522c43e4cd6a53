//! Error types for the Tollgate service.

use thiserror::Error;

/// Main error type for Tollgate operations.
#[derive(Error, Debug)]
pub enum TollgateError {
    /// A new identifier was seen while the limiter already tracks `capacity` identifiers
    #[error("Limiter reached its capacity of {capacity} identifiers")]
    CapacityExceeded { capacity: usize },

    /// Constructor or setter argument outside its documented range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested file does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Requested path is malformed or escapes the served root
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for TollgateError {
    fn from(err: config::ConfigError) -> Self {
        TollgateError::Config(err.to_string())
    }
}

/// Result type alias for Tollgate operations.
pub type Result<T> = std::result::Result<T, TollgateError>;
