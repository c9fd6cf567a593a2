//! Error types for pasim-ap
//!
//! Defines module-specific error types using thiserror for clear error propagation.

use thiserror::Error;

/// Main error type for pasim-ap
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file loading or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Audio resource could not be fetched
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Audio decoding or resampling errors
    #[error("Audio decode error: {0}")]
    Decode(String),

    /// Audio output device errors
    #[error("Audio output error: {0}")]
    AudioOutput(String),

    /// Schedule catalog errors (unknown subject, malformed entry)
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// Invalid time value
    #[error("Invalid time: {0}")]
    InvalidTime(String),

    /// Errors from the shared library
    #[error(transparent)]
    Common(#[from] pasim_common::Error),
}

/// Convenience Result type using pasim-ap Error
pub type Result<T> = std::result::Result<T, Error>;
