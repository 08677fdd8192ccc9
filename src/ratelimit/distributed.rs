//! Distributed sliding-window store backed by Redis.
//!
//! The store answers "how many requests has this key recorded inside the
//! current window?" while also recording the current request, in a single
//! atomic round trip so concurrent callers sharing a key cannot race between
//! the prune, the write, and the count.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::{Client, Script};
use tracing::trace;

use crate::error::Result;

/// Atomic prune + record + count + expiry refresh.
///
/// The sorted set holds one member per request, scored by its timestamp.
/// Expiry is refreshed after every mutation so abandoned keys self-evict;
/// nothing deletes a key explicitly.
const RECORD_AND_COUNT_SCRIPT: &str = r#"
redis.call('ZREMRANGEBYSCORE', KEYS[1], 0, ARGV[1])
redis.call('ZADD', KEYS[1], ARGV[2], ARGV[2])
local count = redis.call('ZCARD', KEYS[1])
redis.call('EXPIRE', KEYS[1], ARGV[3])
return count
"#;

/// Trait for sliding-window store implementations.
///
/// This is the seam between the rate limiter core and the shared store,
/// allowing tests to substitute in-memory or failing doubles for Redis.
#[async_trait]
pub trait SlidingWindowStore: Send + Sync {
    /// Atomically record a request for `key` at `now` (Unix seconds) and
    /// return the number of requests inside `[now - window, now]`,
    /// including the one just recorded.
    ///
    /// Failures are returned as-is; retries and health tracking are the
    /// caller's concern.
    async fn record_and_count(&self, key: &str, now: f64, window: Duration) -> Result<u64>;
}

/// Redis-backed [`SlidingWindowStore`].
pub struct RedisWindowStore {
    connection: ConnectionManager,
    script: Script,
    /// Extra expiry on top of the window, tolerating clock skew across
    /// instances
    expiry_buffer: Duration,
}

impl RedisWindowStore {
    /// Connect to Redis and verify the connection with a ping.
    pub async fn connect(
        url: &str,
        connect_timeout: Duration,
        expiry_buffer: Duration,
    ) -> Result<Self> {
        let client = Client::open(url)?;
        let config = ConnectionManagerConfig::new()
            .set_connection_timeout(connect_timeout)
            .set_response_timeout(connect_timeout);
        let mut connection = client.get_connection_manager_with_config(config).await?;

        redis::cmd("PING").query_async::<()>(&mut connection).await?;

        Ok(Self {
            connection,
            script: Script::new(RECORD_AND_COUNT_SCRIPT),
            expiry_buffer,
        })
    }
}

#[async_trait]
impl SlidingWindowStore for RedisWindowStore {
    async fn record_and_count(&self, key: &str, now: f64, window: Duration) -> Result<u64> {
        let window_start = now - window.as_secs_f64();
        let expiry = window.as_secs() + self.expiry_buffer.as_secs();

        // ConnectionManager is a cheap handle over a shared multiplexed
        // connection; cloning avoids holding &mut self across the await.
        let mut connection = self.connection.clone();
        let count: u64 = self
            .script
            .key(key)
            .arg(window_start)
            .arg(now)
            .arg(expiry)
            .invoke_async(&mut connection)
            .await?;

        trace!(key = %key, count, "Distributed window recorded");
        Ok(count)
    }
}
