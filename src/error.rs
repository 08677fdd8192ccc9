//! Error types for the Floodgate rate limiter.

use thiserror::Error;

/// Main error type for Floodgate operations.
///
/// Note that a denied request is not an error: rate limit decisions are
/// always rendered as a [`Decision`](crate::ratelimit::Decision). Errors here
/// cover misconfiguration and distributed-store failures, both of which are
/// absorbed internally before a decision reaches the caller.
#[derive(Error, Debug)]
pub enum FloodgateError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Distributed window store errors
    #[error("Backend error: {0}")]
    Backend(#[from] redis::RedisError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Floodgate operations.
pub type Result<T> = std::result::Result<T, FloodgateError>;
