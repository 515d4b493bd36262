//! Error types for the resume gateway process

use thiserror::Error;

/// Main error type for gateway startup and serving
#[derive(Error, Debug)]
pub enum GatewayError {
    /// Configuration errors (unreadable file, bad TOML, bad env override)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Listener and server errors
    #[error("Server error: {0}")]
    Server(String),

    /// HTTP client construction errors
    #[error("Client error: {0}")]
    Client(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;
