//! Shared admission contract for the limiter strategies.

use std::time::Duration;

/// Trait for per-key admission control implementations.
///
/// This trait abstracts over [`super::SlidingWindowLimiter`] and
/// [`super::FixedIntervalLimiter`] so calling code can swap strategy without
/// change. All operations are synchronous and complete in bounded time; no
/// operation panics on a key it has never seen.
pub trait AdmissionControl: Send + Sync {
    /// Check whether an event for `key` would currently be admitted.
    ///
    /// Read-only from the caller's perspective; repeated calls at the same
    /// instant return the same answer.
    fn can_send(&self, key: &str) -> bool;

    /// Admit an event for `key` if permitted, committing it into history.
    ///
    /// Returns `true` and mutates state iff the event was admitted. The check
    /// and the commit form a single atomic step per key.
    fn record_message(&self, key: &str) -> bool;

    /// How long the caller must wait before its next event for `key` will be
    /// admitted. Zero means "admit now". Never negative; callers may use the
    /// value directly as a backoff duration.
    fn time_until_next_allowed(&self, key: &str) -> Duration;
}
