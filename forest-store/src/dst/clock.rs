//! `SimClock` - Simulated Time
//!
//! `TigerStyle`: Deterministic, controllable time for simulation.
//! Batch info timestamps come from here under simulation so that stored
//! generations are byte-for-byte reproducible.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::constants::{DST_TIME_ADVANCE_MS_MAX, TIME_MS_PER_SEC};

/// A simulated clock for deterministic testing.
///
/// `TigerStyle`:
/// - Time only moves forward
/// - All time operations are explicit
/// - No reliance on system time
///
/// Clones share the same time.
#[derive(Debug, Clone)]
pub struct SimClock {
    /// Current time in milliseconds since epoch (thread-safe)
    current_ms: Arc<AtomicU64>,
}

impl SimClock {
    /// Create a new clock starting at time zero.
    ///
    /// # Example
    /// ```
    /// use forest_store::dst::SimClock;
    /// let clock = SimClock::new();
    /// assert_eq!(clock.now_ms(), 0);
    /// ```
    #[must_use]
    pub fn new() -> Self {
        Self::at_ms(0)
    }

    /// Create a clock starting at the given millisecond timestamp.
    #[must_use]
    pub fn at_ms(start_ms: u64) -> Self {
        Self {
            current_ms: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    /// Create a clock starting at the given `DateTime`.
    ///
    /// Instants before the epoch clamp to zero.
    #[must_use]
    pub fn at_datetime(dt: DateTime<Utc>) -> Self {
        Self::at_ms(u64::try_from(dt.timestamp_millis()).unwrap_or(0))
    }

    /// Get current time in milliseconds.
    #[must_use]
    pub fn now_ms(&self) -> u64 {
        self.current_ms.load(Ordering::SeqCst)
    }

    /// Get current time in seconds (truncated).
    #[must_use]
    pub fn now_secs(&self) -> u64 {
        self.now_ms() / TIME_MS_PER_SEC
    }

    /// Get current time as `DateTime<Utc>`.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        i64::try_from(self.now_ms())
            .ok()
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or_default()
    }

    /// Advance time by the given milliseconds.
    ///
    /// # Panics
    /// Panics if ms exceeds `DST_TIME_ADVANCE_MS_MAX`.
    ///
    /// # Returns
    /// The new current time.
    pub fn advance_ms(&self, ms: u64) -> u64 {
        // Precondition
        assert!(
            ms <= DST_TIME_ADVANCE_MS_MAX,
            "advance_ms({ms}) exceeds max ({DST_TIME_ADVANCE_MS_MAX})"
        );

        let old_time = self.current_ms.fetch_add(ms, Ordering::SeqCst);
        old_time.saturating_add(ms)
    }

    /// Set time to absolute value.
    ///
    /// # Panics
    /// Panics if new time is less than current time.
    pub fn set_ms(&self, ms: u64) {
        let current = self.now_ms();
        // Precondition
        assert!(ms >= current, "cannot set time backwards: {ms} < {current}");

        self.current_ms.store(ms, Ordering::SeqCst);
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_time() {
        let clock = SimClock::new();
        assert_eq!(clock.now_ms(), 0);
        assert_eq!(clock.now_secs(), 0);
    }

    #[test]
    fn test_at_datetime() {
        let dt = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .to_utc();
        let clock = SimClock::at_datetime(dt);
        assert_eq!(clock.now(), dt);
    }

    #[test]
    fn test_advance_shared_between_clones() {
        let clock = SimClock::new();
        let other = clock.clone();

        assert_eq!(clock.advance_ms(1500), 1500);
        assert_eq!(other.now_ms(), 1500);
        assert_eq!(other.now_secs(), 1);
    }

    #[test]
    fn test_set_ms() {
        let clock = SimClock::at_ms(100);
        clock.set_ms(500);
        assert_eq!(clock.now_ms(), 500);
    }

    #[test]
    #[should_panic(expected = "cannot set time backwards")]
    fn test_set_backwards_panics() {
        let clock = SimClock::at_ms(100);
        clock.set_ms(50);
    }

    #[test]
    #[should_panic(expected = "exceeds max")]
    fn test_advance_too_far_panics() {
        let clock = SimClock::new();
        clock.advance_ms(DST_TIME_ADVANCE_MS_MAX + 1);
    }
}
