//! Fixed-interval (throttling) admission control.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, trace};

use super::backend::AdmissionControl;
use crate::clock::{Clock, SystemClock};

/// Admits at most one event per key per `min_interval` since that key's last
/// admitted event.
///
/// Only the most recent admission matters for the rule "no two admissions
/// closer together than I", so state is a single timestamp per key: O(1)
/// memory and time, at the cost of never allowing the bursts a sliding
/// window would. Entries are overwritten on each new admission, never
/// appended, and are kept for the life of the limiter.
pub struct FixedIntervalLimiter {
    /// Minimum spacing between admitted events for one key
    min_interval: Duration,
    /// Most recent admission per key
    last_seen: DashMap<String, Instant>,
    /// Time source for admission decisions
    clock: Arc<dyn Clock>,
}

impl FixedIntervalLimiter {
    /// Create a limiter reading the monotonic system clock.
    ///
    /// A zero `min_interval` admits every event.
    pub fn new(min_interval: Duration) -> Self {
        Self::with_clock(min_interval, Arc::new(SystemClock))
    }

    /// Create a limiter with an injected time source.
    pub fn with_clock(min_interval: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            min_interval,
            last_seen: DashMap::new(),
            clock,
        }
    }

    /// Check whether an event for `key` would currently be admitted.
    ///
    /// A key with no recorded admission is immediately eligible.
    pub fn can_send(&self, key: &str) -> bool {
        let now = self.clock.now();
        let eligible = match self.last_seen.get(key) {
            Some(last) => now.saturating_duration_since(*last) >= self.min_interval,
            None => true,
        };

        trace!(key = %key, eligible = eligible, "Checking throttle interval");

        eligible
    }

    /// Admit an event for `key` if permitted, overwriting its last-seen
    /// timestamp with the current instant.
    pub fn record_message(&self, key: &str) -> bool {
        let now = self.clock.now();

        // The entry guard makes the spacing check and the overwrite one
        // atomic step per key.
        let admitted = match self.last_seen.entry(key.to_string()) {
            Entry::Vacant(vacant) => {
                vacant.insert(now);
                true
            }
            Entry::Occupied(mut occupied) => {
                if now.saturating_duration_since(*occupied.get()) >= self.min_interval {
                    occupied.insert(now);
                    true
                } else {
                    false
                }
            }
        };

        if !admitted {
            debug!(key = %key, "Throttle interval not yet elapsed");
        }
        admitted
    }

    /// How long until the next event for `key` will be admitted.
    ///
    /// Zero for a key that has never been admitted; otherwise the remainder
    /// of the interval since its last admission, clamped to zero.
    pub fn time_until_next_allowed(&self, key: &str) -> Duration {
        let now = self.clock.now();
        match self.last_seen.get(key) {
            Some(last) => self
                .min_interval
                .saturating_sub(now.saturating_duration_since(*last)),
            None => Duration::ZERO,
        }
    }

    /// Number of keys with a recorded admission.
    pub fn tracked_keys(&self) -> usize {
        self.last_seen.len()
    }
}

impl AdmissionControl for FixedIntervalLimiter {
    fn can_send(&self, key: &str) -> bool {
        FixedIntervalLimiter::can_send(self, key)
    }

    fn record_message(&self, key: &str) -> bool {
        FixedIntervalLimiter::record_message(self, key)
    }

    fn time_until_next_allowed(&self, key: &str) -> Duration {
        FixedIntervalLimiter::time_until_next_allowed(self, key)
    }
}
