//! In-memory sliding-window fallback store.
//!
//! Used when the distributed store is unavailable. Counts are process-local,
//! so admission under fallback is an approximation of the cross-instance
//! total; entries are pruned on access and by an amortized periodic sweep so
//! memory stays bounded by the number of distinct active keys.

use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, trace};

/// Process-wide sliding-window log keyed by client key.
///
/// Each check holds the map entry guard for its key across the prune, length
/// check, and append, so concurrent requests for the same key are serialized
/// without a global lock.
pub struct MemoryWindowStore {
    /// Request timestamps (Unix seconds) per client key
    entries: DashMap<String, Vec<f64>>,
    /// Minimum interval between full sweeps
    sweep_interval: Duration,
    /// When the last sweep ran, Unix seconds
    last_sweep: Mutex<f64>,
}

impl MemoryWindowStore {
    /// Create a new store that sweeps at most once per `sweep_interval`.
    pub fn new(sweep_interval: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            sweep_interval,
            last_sweep: Mutex::new(0.0),
        }
    }

    /// Check the rate limit for a key, recording the request if admitted.
    ///
    /// Prunes the key's records to the current window, then returns `true`
    /// (limited) when the pruned count already meets `max_requests`. A denied
    /// request is not recorded and does not consume a slot.
    pub fn check_and_record(
        &self,
        key: &str,
        now: f64,
        window: Duration,
        max_requests: u32,
    ) -> bool {
        self.maybe_sweep(now, window);

        let window_secs = window.as_secs_f64();
        let mut records = self.entries.entry(key.to_string()).or_default();
        records.retain(|&t| now - t < window_secs);

        if records.len() >= max_requests as usize {
            trace!(key = %key, count = records.len(), "Memory store over limit");
            return true;
        }

        records.push(now);
        false
    }

    /// Prune every key and drop empty keys, at most once per sweep interval.
    ///
    /// Amortized across calls rather than run on a timer; the cost is paid by
    /// whichever request happens to cross the interval boundary.
    fn maybe_sweep(&self, now: f64, window: Duration) {
        {
            let mut last_sweep = self.last_sweep.lock();
            if now - *last_sweep < self.sweep_interval.as_secs_f64() {
                return;
            }
            *last_sweep = now;
        }

        let window_secs = window.as_secs_f64();
        let before = self.entries.len();
        self.entries.retain(|_, records| {
            records.retain(|&t| now - t < window_secs);
            !records.is_empty()
        });

        // A concurrent check can insert a new key mid-retain, so the map may
        // have grown since `before` was captured.
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed, "Swept expired rate limit keys from memory store");
        }
    }

    /// Get the number of keys currently held.
    pub fn key_count(&self) -> usize {
        self.entries.len()
    }

    /// Get the number of recorded requests for a key.
    ///
    /// Returns `None` if the key is not present. This is primarily useful
    /// for testing.
    pub fn record_count(&self, key: &str) -> Option<usize> {
        self.entries.get(key).map(|records| records.len())
    }
}
