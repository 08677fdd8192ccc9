//! Rate limit policy definition.

use std::time::Duration;

use crate::error::{FloodgateError, Result};

/// An immutable rate limit policy: at most `max_requests` requests per
/// caller within a rolling `window`.
///
/// One policy is created per protected operation category and lives for the
/// process lifetime. The policy name scopes client keys so that two policies
/// watching the same caller never share a window log.
#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    /// Name of the protected operation category, e.g. `upload`
    name: String,
    /// Maximum requests allowed in the window
    max_requests: u32,
    /// Length of the rolling window
    window: Duration,
}

impl RateLimitPolicy {
    /// Create a new policy.
    ///
    /// Returns a configuration error when `max_requests` or `window_seconds`
    /// is zero, or when the name is empty.
    pub fn new(name: &str, max_requests: u32, window_seconds: u64) -> Result<Self> {
        if name.is_empty() {
            return Err(FloodgateError::Config(
                "policy name must not be empty".to_string(),
            ));
        }
        if max_requests == 0 {
            return Err(FloodgateError::Config(
                "max_requests must be greater than zero".to_string(),
            ));
        }
        if window_seconds == 0 {
            return Err(FloodgateError::Config(
                "window_seconds must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            name: name.to_string(),
            max_requests,
            window: Duration::from_secs(window_seconds),
        })
    }

    /// Get the policy name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the maximum requests allowed in the window.
    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    /// Get the window duration.
    pub fn window(&self) -> Duration {
        self.window
    }
}
