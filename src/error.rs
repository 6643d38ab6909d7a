//! Error types for the Turnstile admission gate.

use thiserror::Error;

/// Main error type for Turnstile operations.
#[derive(Error, Debug)]
pub enum TurnstileError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A rate limit policy that can never admit a request
    #[error("Invalid policy for scope {scope}: {reason}")]
    InvalidPolicy {
        scope: &'static str,
        reason: String,
    },

    /// Identity resolution failures (treated as "no principal" by the gate)
    #[error("Identity resolution error: {0}")]
    Identity(String),

    /// HTTP server errors
    #[error("Server error: {0}")]
    Server(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for TurnstileError {
    fn from(err: config::ConfigError) -> Self {
        TurnstileError::Config(err.to_string())
    }
}

/// Result type alias for Turnstile operations.
pub type Result<T> = std::result::Result<T, TurnstileError>;
