//! Configuration management for Floodgate.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Process-wide settings for the rate limiting backend.
///
/// Per-policy limits (`max_requests`, `window_seconds`) live on
/// [`RateLimitPolicy`](crate::ratelimit::RateLimitPolicy); this struct only
/// carries what is shared by every policy in the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FloodgateConfig {
    /// Redis connection URL. Absent means the process runs in
    /// memory-fallback-only mode for its entire life.
    pub redis_url: Option<String>,

    /// Seconds to wait after a Redis failure before the next attempt
    #[serde(default = "default_recovery_delay")]
    pub recovery_delay_secs: u64,

    /// Minimum seconds between sweeps of the memory fallback store
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Extra seconds added to key expiry to tolerate clock skew
    #[serde(default = "default_expiry_buffer")]
    pub expiry_buffer_secs: u64,

    /// Redis connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for FloodgateConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            recovery_delay_secs: default_recovery_delay(),
            sweep_interval_secs: default_sweep_interval(),
            expiry_buffer_secs: default_expiry_buffer(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

fn default_recovery_delay() -> u64 {
    30
}

fn default_sweep_interval() -> u64 {
    300
}

fn default_expiry_buffer() -> u64 {
    10
}

fn default_connect_timeout() -> u64 {
    5
}

impl FloodgateConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &str) -> crate::error::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: FloodgateConfig = serde_yaml::from_str(&contents)
            .map_err(|e| crate::error::FloodgateError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Build configuration from the environment, reading `REDIS_URL` if set.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL").ok().filter(|u| !u.is_empty()),
            ..Self::default()
        }
    }

    /// Recovery delay as a [`Duration`].
    pub fn recovery_delay(&self) -> Duration {
        Duration::from_secs(self.recovery_delay_secs)
    }

    /// Sweep interval as a [`Duration`].
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// Expiry buffer as a [`Duration`].
    pub fn expiry_buffer(&self) -> Duration {
        Duration::from_secs(self.expiry_buffer_secs)
    }
}
