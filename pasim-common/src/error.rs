//! Common error types for PASIM

use thiserror::Error;

/// Common result type for PASIM operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types shared by the simulator crates
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed `HH:MM:SS` / `HH:MM` value
    #[error("Invalid time: {0}")]
    InvalidTime(String),
}
