//! Sliding-window admission control.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{debug, trace};

use super::backend::AdmissionControl;
use crate::clock::{Clock, SystemClock};

/// Admits up to `max_requests` events per key inside any trailing window of
/// `window_size`.
///
/// Each key's history is an ordered sequence of admission timestamps, oldest
/// first. A counter alone cannot tell "N events in the last W seconds" apart
/// from "N events in some stale bucket", so the full log is kept; its length
/// never exceeds `max_requests` because denied attempts append nothing.
///
/// Thread-safe: per-key state lives in a [`DashMap`], and `record_message`
/// performs its check and commit under the key's entry guard so two
/// concurrent callers cannot jointly overshoot the limit. Keys are fully
/// independent.
pub struct SlidingWindowLimiter {
    /// Trailing window duration
    window_size: Duration,
    /// Maximum admitted events per key within the window
    max_requests: u32,
    /// Admission timestamps per key, oldest first
    history: DashMap<String, VecDeque<Instant>>,
    /// Time source for admission decisions
    clock: Arc<dyn Clock>,
}

impl SlidingWindowLimiter {
    /// Create a limiter reading the monotonic system clock.
    ///
    /// A `max_requests` of 0 denies every `record_message` call; a zero
    /// `window_size` makes every admitted event stale immediately.
    pub fn new(window_size: Duration, max_requests: u32) -> Self {
        Self::with_clock(window_size, max_requests, Arc::new(SystemClock))
    }

    /// Create a limiter with an injected time source.
    pub fn with_clock(window_size: Duration, max_requests: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            window_size,
            max_requests,
            history: DashMap::new(),
            clock,
        }
    }

    /// Check whether an event for `key` would currently be admitted.
    ///
    /// Evicts the key's stale history as a side effect but never adds to it,
    /// so repeated calls at the same instant return the same answer.
    pub fn can_send(&self, key: &str) -> bool {
        let now = self.clock.now();
        let occupancy = self.cleaned_occupancy(key, now);

        trace!(key = %key, occupancy = occupancy, "Checking sliding window");

        occupancy < self.max_requests as usize
    }

    /// Admit an event for `key` if permitted, appending the current instant
    /// to its history. This is the only operation that grows a sequence.
    pub fn record_message(&self, key: &str) -> bool {
        let now = self.clock.now();

        // The entry guard holds the key's shard exclusively, making the
        // check and the append one atomic step.
        let admitted = {
            let mut entry = self.history.entry(key.to_string()).or_default();
            Self::evict_stale(&mut entry, now, self.window_size);
            let admitted = entry.len() < self.max_requests as usize;
            if admitted {
                entry.push_back(now);
            }
            admitted
        };

        // Only active keys are retained; an entry left empty here (possible
        // with max_requests = 0) would otherwise leak.
        self.history.remove_if(key, |_, timestamps| timestamps.is_empty());

        if !admitted {
            debug!(key = %key, "Sliding window limit exceeded");
        }
        admitted
    }

    /// How long until the next event for `key` will be admitted.
    ///
    /// Zero when the key is absent or under the limit; otherwise the time
    /// remaining until the oldest surviving admission ages out of the window,
    /// clamped to zero.
    pub fn time_until_next_allowed(&self, key: &str) -> Duration {
        let now = self.clock.now();
        let oldest = match self.history.get_mut(key) {
            Some(mut entry) => {
                Self::evict_stale(&mut entry, now, self.window_size);
                if entry.len() < self.max_requests as usize {
                    None
                } else {
                    entry.front().copied()
                }
            }
            None => None,
        };
        self.history.remove_if(key, |_, timestamps| timestamps.is_empty());

        match oldest {
            Some(oldest) => self
                .window_size
                .saturating_sub(now.saturating_duration_since(oldest)),
            None => Duration::ZERO,
        }
    }

    /// Number of keys currently holding history.
    ///
    /// Bounded by the set of keys with at least one admission inside the
    /// current window.
    pub fn tracked_keys(&self) -> usize {
        self.history.len()
    }

    /// Evict the key's stale history against `now` and return the surviving
    /// count, removing the key entirely once its history empties.
    fn cleaned_occupancy(&self, key: &str, now: Instant) -> usize {
        let occupancy = match self.history.get_mut(key) {
            Some(mut entry) => {
                Self::evict_stale(&mut entry, now, self.window_size);
                entry.len()
            }
            None => 0,
        };
        if occupancy == 0 {
            self.history.remove_if(key, |_, timestamps| timestamps.is_empty());
        }
        occupancy
    }

    /// Drop timestamps older than the window boundary from the front of the
    /// sequence. The sequence is oldest-first, so only a prefix can be stale
    /// and the cost is proportional to the expired count.
    fn evict_stale(timestamps: &mut VecDeque<Instant>, now: Instant, window_size: Duration) {
        // Underflows only near the process start; nothing can be older.
        let Some(window_start) = now.checked_sub(window_size) else {
            return;
        };
        while let Some(&front) = timestamps.front() {
            if front < window_start {
                timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

impl AdmissionControl for SlidingWindowLimiter {
    fn can_send(&self, key: &str) -> bool {
        SlidingWindowLimiter::can_send(self, key)
    }

    fn record_message(&self, key: &str) -> bool {
        SlidingWindowLimiter::record_message(self, key)
    }

    fn time_until_next_allowed(&self, key: &str) -> Duration {
        SlidingWindowLimiter::time_until_next_allowed(self, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn limiter_at(
        window_secs: u64,
        max_requests: u32,
    ) -> (SlidingWindowLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let limiter =
            SlidingWindowLimiter::with_clock(Duration::from_secs(window_secs), max_requests, clock.clone());
        (limiter, clock)
    }

    #[test]
    fn test_first_message_admitted() {
        let (limiter, _clock) = limiter_at(10, 1);

        assert!(limiter.can_send("user_1"));
        assert!(limiter.record_message("user_1"));
    }

    #[test]
    fn test_window_example() {
        let (limiter, clock) = limiter_at(10, 1);

        assert!(limiter.record_message("user_1"));

        clock.advance(Duration::from_secs(5));
        assert!(!limiter.can_send("user_1"));
        assert_eq!(
            limiter.time_until_next_allowed("user_1"),
            Duration::from_secs(5)
        );

        clock.advance(Duration::from_millis(5100));
        assert!(limiter.can_send("user_1"));
    }

    #[test]
    fn test_at_most_n_within_window() {
        let (limiter, clock) = limiter_at(10, 3);

        let mut admitted = 0;
        for _ in 0..10 {
            if limiter.record_message("user_1") {
                admitted += 1;
            }
            clock.advance(Duration::from_millis(100));
        }

        // All ten attempts fall inside one window.
        assert_eq!(admitted, 3);
    }

    #[test]
    fn test_denied_attempts_do_not_grow_history() {
        let (limiter, clock) = limiter_at(10, 1);

        assert!(limiter.record_message("user_1"));
        for _ in 0..5 {
            assert!(!limiter.record_message("user_1"));
        }

        // Only the single admission should age out; one denied append would
        // have kept the key tracked past this point.
        clock.advance(Duration::from_millis(10_100));
        assert!(limiter.can_send("user_1"));
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[test]
    fn test_aged_out_keys_are_dropped() {
        let (limiter, clock) = limiter_at(10, 2);

        assert!(limiter.record_message("user_1"));
        assert!(limiter.record_message("user_2"));
        assert_eq!(limiter.tracked_keys(), 2);

        clock.advance(Duration::from_secs(11));

        // Any cleanup-triggering call prunes the touched key.
        assert!(limiter.can_send("user_1"));
        assert_eq!(limiter.time_until_next_allowed("user_2"), Duration::ZERO);
        assert_eq!(limiter.tracked_keys(), 0);
    }

    #[test]
    fn test_read_only_checks_are_idempotent() {
        let (limiter, clock) = limiter_at(10, 1);

        assert!(limiter.record_message("user_1"));
        clock.advance(Duration::from_secs(3));

        for _ in 0..5 {
            assert!(!limiter.can_send("user_1"));
            assert_eq!(
                limiter.time_until_next_allowed("user_1"),
                Duration::from_secs(7)
            );
        }
    }

    #[test]
    fn test_keys_are_independent() {
        let (limiter, _clock) = limiter_at(10, 1);

        assert!(limiter.record_message("user_1"));
        assert!(!limiter.record_message("user_1"));

        assert!(limiter.can_send("user_2"));
        assert!(limiter.record_message("user_2"));
    }

    #[test]
    fn test_zero_limit_denies_everything() {
        let (limiter, clock) = limiter_at(10, 0);

        for _ in 0..3 {
            assert!(!limiter.can_send("user_1"));
            assert!(!limiter.record_message("user_1"));
            clock.advance(Duration::from_secs(20));
        }

        // Nothing is ever committed, so nothing is tracked.
        assert_eq!(limiter.tracked_keys(), 0);
        assert_eq!(limiter.time_until_next_allowed("user_1"), Duration::ZERO);
    }

    #[test]
    fn test_wait_time_tracks_oldest_admission() {
        let (limiter, clock) = limiter_at(10, 2);

        assert!(limiter.record_message("user_1"));
        clock.advance(Duration::from_secs(4));
        assert!(limiter.record_message("user_1"));

        // Full now; the slot opens when the first admission leaves the window.
        assert_eq!(
            limiter.time_until_next_allowed("user_1"),
            Duration::from_secs(6)
        );

        clock.advance(Duration::from_secs(7));
        assert!(limiter.can_send("user_1"));
        assert_eq!(limiter.time_until_next_allowed("user_1"), Duration::ZERO);
    }

    #[test]
    fn test_window_slides_rather_than_resets() {
        let (limiter, clock) = limiter_at(10, 2);

        assert!(limiter.record_message("user_1"));
        clock.advance(Duration::from_secs(6));
        assert!(limiter.record_message("user_1"));

        // t=11: the first admission has aged out, the second has not.
        clock.advance(Duration::from_secs(5));
        assert!(limiter.can_send("user_1"));
        assert!(limiter.record_message("user_1"));
        assert!(!limiter.can_send("user_1"));
    }

    #[test]
    fn test_unseen_key_reports_zero_wait() {
        let (limiter, _clock) = limiter_at(10, 1);

        assert_eq!(limiter.time_until_next_allowed("never_seen"), Duration::ZERO);
    }

    #[test]
    fn test_concurrent_admissions_respect_limit() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let limiter = Arc::new(SlidingWindowLimiter::new(Duration::from_secs(60), 5));
        let admitted = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                let admitted = admitted.clone();
                std::thread::spawn(move || {
                    for _ in 0..10 {
                        if limiter.record_message("shared") {
                            admitted.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(admitted.load(Ordering::SeqCst), 5);
    }
}
