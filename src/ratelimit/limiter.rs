//! Core rate limiter implementation.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, info, trace, warn};

use crate::config::FloodgateConfig;
use crate::ratelimit::breaker::HealthBreaker;
use crate::ratelimit::client_key::{resolve_client_key, RequestContext};
use crate::ratelimit::distributed::{RedisWindowStore, SlidingWindowStore};
use crate::ratelimit::memory::MemoryWindowStore;
use crate::ratelimit::policy::RateLimitPolicy;

/// The outcome of a rate limit evaluation.
///
/// When `allowed` is false the caller is expected to reject the request with
/// a "too many requests" status and a `Retry-After` header carrying
/// `retry_after_secs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Whether the request may proceed
    pub allowed: bool,
    /// Conservative backoff hint; always the policy window, not the actual
    /// remaining time
    pub retry_after_secs: u64,
}

/// Process-wide rate limiting state shared by every policy.
///
/// Holds the distributed store, the memory fallback, and the health breaker.
/// Constructed once and passed to each [`RateLimiter`] explicitly rather
/// than living in ambient global state.
pub struct RateLimitBackend {
    /// Distributed window store, absent in fallback-only mode
    distributed: Option<Arc<dyn SlidingWindowStore>>,
    /// Process-local fallback used while the breaker is unhealthy
    fallback: MemoryWindowStore,
    /// Health state for the distributed store. One breaker per backend: a
    /// single failing store degrades every policy sharing it.
    breaker: Arc<HealthBreaker>,
}

impl RateLimitBackend {
    /// Build a backend from configuration, connecting to Redis if a URL is
    /// configured.
    ///
    /// A missing URL or a failed initial connection degrades to permanent
    /// fallback-only mode; neither is an error for the caller.
    pub async fn connect(config: &FloodgateConfig) -> Arc<Self> {
        let fallback = MemoryWindowStore::new(config.sweep_interval());

        let Some(url) = config.redis_url.as_deref() else {
            warn!("No Redis URL configured, rate limiting uses the memory store only");
            return Arc::new(Self {
                distributed: None,
                fallback,
                breaker: Arc::new(HealthBreaker::permanently_unhealthy()),
            });
        };

        let connect_timeout = Duration::from_secs(config.connect_timeout_secs);
        match RedisWindowStore::connect(url, connect_timeout, config.expiry_buffer()).await {
            Ok(store) => {
                info!("Redis connection established for rate limiting");
                Arc::new(Self {
                    distributed: Some(Arc::new(store)),
                    fallback,
                    breaker: Arc::new(HealthBreaker::new(config.recovery_delay())),
                })
            }
            Err(e) => {
                warn!(error = %e, "Redis unavailable, rate limiting uses the memory store only");
                Arc::new(Self {
                    distributed: None,
                    fallback,
                    breaker: Arc::new(HealthBreaker::permanently_unhealthy()),
                })
            }
        }
    }

    /// Build a backend around an existing store implementation.
    pub fn with_store(
        store: Arc<dyn SlidingWindowStore>,
        recovery_delay: Duration,
        sweep_interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            distributed: Some(store),
            fallback: MemoryWindowStore::new(sweep_interval),
            breaker: Arc::new(HealthBreaker::new(recovery_delay)),
        })
    }

    /// Build a backend with no distributed store.
    pub fn memory_only(sweep_interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            distributed: None,
            fallback: MemoryWindowStore::new(sweep_interval),
            breaker: Arc::new(HealthBreaker::permanently_unhealthy()),
        })
    }

    /// Get the health breaker.
    pub fn breaker(&self) -> &Arc<HealthBreaker> {
        &self.breaker
    }

    /// Get the memory fallback store.
    pub fn fallback(&self) -> &MemoryWindowStore {
        &self.fallback
    }
}

/// A rate limiter for one policy, evaluating requests against the shared
/// backend.
///
/// The limiter itself is stateless per call; everything mutable lives in the
/// backend it references.
pub struct RateLimiter {
    policy: RateLimitPolicy,
    backend: Arc<RateLimitBackend>,
}

impl RateLimiter {
    /// Create a new rate limiter for a policy.
    pub fn new(policy: RateLimitPolicy, backend: Arc<RateLimitBackend>) -> Self {
        Self { policy, backend }
    }

    /// Get the policy this limiter enforces.
    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Evaluate a request and render an allow/deny decision.
    ///
    /// Never fails: distributed-store errors trip the breaker and the
    /// evaluation falls through to the memory store, so every failure path
    /// terminates in a boolean decision.
    pub async fn evaluate(&self, ctx: &RequestContext) -> Decision {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs_f64();
        self.evaluate_at(ctx, now).await
    }

    /// Evaluate a request at an explicit timestamp (Unix seconds).
    pub async fn evaluate_at(&self, ctx: &RequestContext, now: f64) -> Decision {
        let key = resolve_client_key(self.policy.name(), ctx);

        trace!(key = %key, "Checking rate limit");
        let limited = self.is_limited(&key, now).await;

        if limited {
            debug!(key = %key, "Rate limit exceeded");
        }

        Decision {
            allowed: !limited,
            retry_after_secs: self.policy.window().as_secs(),
        }
    }

    /// Check one key against the distributed store, falling back to the
    /// memory store on breaker state or on failure.
    ///
    /// Note the documented boundary asymmetry between the two paths: the
    /// distributed store records the request that tips the count over the
    /// limit, while the memory store does not record a denied request.
    async fn is_limited(&self, key: &str, now: f64) -> bool {
        if self.backend.breaker.is_healthy() {
            if let Some(ref store) = self.backend.distributed {
                match store.record_and_count(key, now, self.policy.window()).await {
                    Ok(count) => return count > u64::from(self.policy.max_requests()),
                    Err(e) => {
                        warn!(key = %key, error = %e, "Distributed rate limit check failed");
                        self.backend.breaker.record_failure();
                    }
                }
            }
        }

        self.backend
            .fallback
            .check_and_record(key, now, self.policy.window(), self.policy.max_requests())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FloodgateError, Result};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory stand-in for the Redis store, mirroring its semantics:
    /// the request is recorded before the count is taken, so an over-limit
    /// request still consumes a slot.
    #[derive(Default)]
    struct RecordingStore {
        windows: Mutex<HashMap<String, Vec<f64>>>,
        calls: AtomicUsize,
    }

    impl RecordingStore {
        fn record_count(&self, key: &str) -> usize {
            self.windows.lock().get(key).map_or(0, Vec::len)
        }
    }

    #[async_trait]
    impl SlidingWindowStore for RecordingStore {
        async fn record_and_count(&self, key: &str, now: f64, window: Duration) -> Result<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut windows = self.windows.lock();
            let records = windows.entry(key.to_string()).or_default();
            records.retain(|&t| now - t < window.as_secs_f64());
            records.push(now);
            Ok(records.len() as u64)
        }
    }

    /// A store whose every call fails with a connection error.
    #[derive(Default)]
    struct FailingStore {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SlidingWindowStore for FailingStore {
        async fn record_and_count(&self, _key: &str, _now: f64, _window: Duration) -> Result<u64> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(FloodgateError::Backend(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "connection refused",
            ))))
        }
    }

    /// Route test logs through a subscriber honoring `RUST_LOG`; later calls
    /// are no-ops once one is installed.
    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    }

    fn test_ctx() -> RequestContext {
        RequestContext {
            remote_addr: Some("10.0.0.1".to_string()),
            ..Default::default()
        }
    }

    fn test_policy() -> RateLimitPolicy {
        RateLimitPolicy::new("test", 3, 60).unwrap()
    }

    #[tokio::test]
    async fn test_allows_up_to_limit_then_denies() {
        let store = Arc::new(RecordingStore::default());
        let backend = RateLimitBackend::with_store(
            store.clone(),
            Duration::from_secs(30),
            Duration::from_secs(300),
        );
        let limiter = RateLimiter::new(test_policy(), backend);
        let ctx = test_ctx();

        for t in [0.0, 1.0, 2.0] {
            let decision = limiter.evaluate_at(&ctx, t).await;
            assert!(decision.allowed, "request at t={} should be allowed", t);
        }

        let decision = limiter.evaluate_at(&ctx, 3.0).await;
        assert!(!decision.allowed);
        assert_eq!(decision.retry_after_secs, 60);
    }

    #[tokio::test]
    async fn test_distributed_records_denied_request() {
        let store = Arc::new(RecordingStore::default());
        let backend = RateLimitBackend::with_store(
            store.clone(),
            Duration::from_secs(30),
            Duration::from_secs(300),
        );
        let limiter = RateLimiter::new(test_policy(), backend);
        let ctx = test_ctx();

        for t in [0.0, 1.0, 2.0, 3.0] {
            limiter.evaluate_at(&ctx, t).await;
        }

        // The denied fourth request still consumed a slot in the store,
        // unlike the memory fallback path.
        assert_eq!(store.record_count("rate_limit:test:ip:10.0.0.1"), 4);
    }

    #[tokio::test]
    async fn test_sliding_window_frees_slot() {
        let store = Arc::new(RecordingStore::default());
        let backend = RateLimitBackend::with_store(
            store.clone(),
            Duration::from_secs(30),
            Duration::from_secs(300),
        );
        let limiter = RateLimiter::new(test_policy(), backend);
        let ctx = test_ctx();

        for t in [0.0, 1.0, 2.0] {
            assert!(limiter.evaluate_at(&ctx, t).await.allowed);
        }

        // t=0 has aged out of the 60s window by t=61.
        assert!(limiter.evaluate_at(&ctx, 61.0).await.allowed);
    }

    #[tokio::test]
    async fn test_failure_trips_breaker_and_falls_back() {
        init_tracing();
        let store = Arc::new(FailingStore::default());
        let backend = RateLimitBackend::with_store(
            store.clone(),
            Duration::from_secs(30),
            Duration::from_secs(300),
        );
        let limiter = RateLimiter::new(test_policy(), backend.clone());
        let ctx = test_ctx();

        let decision = limiter.evaluate_at(&ctx, 0.0).await;
        assert!(decision.allowed, "fallback should admit the first request");
        assert!(!backend.breaker().is_healthy());
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);

        // While the breaker is open, the distributed store is not attempted.
        limiter.evaluate_at(&ctx, 1.0).await;
        limiter.evaluate_at(&ctx, 2.0).await;
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_breaker_recovery_reattempts_distributed_path() {
        let store = Arc::new(FailingStore::default());
        let backend = RateLimitBackend::with_store(
            store.clone(),
            Duration::from_millis(50),
            Duration::from_secs(300),
        );
        let limiter = RateLimiter::new(test_policy(), backend);
        let ctx = test_ctx();

        limiter.evaluate_at(&ctx, 0.0).await;
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(120)).await;

        limiter.evaluate_at(&ctx, 1.0).await;
        assert_eq!(store.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_fallback_enforces_limit_during_outage() {
        let store = Arc::new(FailingStore::default());
        let backend = RateLimitBackend::with_store(
            store,
            Duration::from_secs(30),
            Duration::from_secs(300),
        );
        let limiter = RateLimiter::new(test_policy(), backend.clone());
        let ctx = test_ctx();

        for t in [0.0, 1.0, 2.0] {
            assert!(limiter.evaluate_at(&ctx, t).await.allowed);
        }
        assert!(!limiter.evaluate_at(&ctx, 3.0).await.allowed);

        // The denied request was not recorded by the fallback.
        assert_eq!(
            backend.fallback().record_count("rate_limit:test:ip:10.0.0.1"),
            Some(3)
        );
    }

    #[tokio::test]
    async fn test_memory_only_backend() {
        let backend = RateLimitBackend::memory_only(Duration::from_secs(300));
        let limiter = RateLimiter::new(RateLimitPolicy::new("test", 1, 60).unwrap(), backend);
        let ctx = test_ctx();

        assert!(limiter.evaluate_at(&ctx, 0.0).await.allowed);
        assert!(!limiter.evaluate_at(&ctx, 1.0).await.allowed);
    }

    #[tokio::test]
    async fn test_policies_do_not_share_windows() {
        let backend = RateLimitBackend::memory_only(Duration::from_secs(300));
        let uploads = RateLimiter::new(
            RateLimitPolicy::new("upload", 1, 60).unwrap(),
            backend.clone(),
        );
        let searches = RateLimiter::new(
            RateLimitPolicy::new("search", 1, 60).unwrap(),
            backend,
        );
        let ctx = test_ctx();

        assert!(uploads.evaluate_at(&ctx, 0.0).await.allowed);
        assert!(!uploads.evaluate_at(&ctx, 1.0).await.allowed);

        // Same caller, different policy: its own window.
        assert!(searches.evaluate_at(&ctx, 1.0).await.allowed);
    }

    #[tokio::test]
    async fn test_connect_without_url_degrades_to_memory_only() {
        let config = FloodgateConfig::default();
        let backend = RateLimitBackend::connect(&config).await;
        assert!(!backend.breaker().is_healthy());

        let limiter = RateLimiter::new(test_policy(), backend);
        assert!(limiter.evaluate_at(&test_ctx(), 0.0).await.allowed);
    }
}
