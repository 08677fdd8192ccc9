//! Health circuit breaker for the distributed window store.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{info, warn};

/// Tracks distributed-store health and schedules recovery probes.
///
/// The breaker starts healthy. Any recorded failure flips it unhealthy and
/// schedules exactly one deferred recovery; after the fixed delay the breaker
/// resets and the next request retries the distributed path. There is no
/// backoff and no distinction between transient and permanent failures.
///
/// A breaker built with [`HealthBreaker::permanently_unhealthy`] never
/// recovers; it models a process started without a distributed store.
pub struct HealthBreaker {
    state: Mutex<BreakerState>,
    /// How long to wait before resetting to healthy after a failure
    recovery_delay: Duration,
    /// Set when no distributed store exists; overrides all transitions
    permanent_fallback: bool,
}

#[derive(Debug)]
struct BreakerState {
    healthy: bool,
    recovery_pending: bool,
}

impl HealthBreaker {
    /// Create a healthy breaker with the given recovery delay.
    pub fn new(recovery_delay: Duration) -> Self {
        Self {
            state: Mutex::new(BreakerState {
                healthy: true,
                recovery_pending: false,
            }),
            recovery_delay,
            permanent_fallback: false,
        }
    }

    /// Create a breaker that is unhealthy for the process lifetime.
    pub fn permanently_unhealthy() -> Self {
        Self {
            state: Mutex::new(BreakerState {
                healthy: false,
                recovery_pending: false,
            }),
            recovery_delay: Duration::ZERO,
            permanent_fallback: true,
        }
    }

    /// Whether the distributed store should be attempted.
    pub fn is_healthy(&self) -> bool {
        !self.permanent_fallback && self.state.lock().healthy
    }

    /// Record a distributed-store failure.
    ///
    /// Flips the breaker unhealthy and schedules a single deferred recovery.
    /// Further failures while a recovery is pending do not schedule another.
    pub fn record_failure(self: &Arc<Self>) {
        if self.permanent_fallback {
            return;
        }

        {
            let mut state = self.state.lock();
            state.healthy = false;
            if state.recovery_pending {
                return;
            }
            state.recovery_pending = true;
        }

        warn!(
            delay_secs = self.recovery_delay.as_secs(),
            "Distributed store unhealthy, falling back to memory store"
        );

        let breaker = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(breaker.recovery_delay).await;

            {
                let mut state = breaker.state.lock();
                state.healthy = true;
                state.recovery_pending = false;
            }
            info!("Distributed store health reset, next request will retry");
        });
    }
}
