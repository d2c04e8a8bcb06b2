//! Relative-delay bookkeeping for recordings.
//!
//! # Why relative delays? (for beginners)
//!
//! A macro file stores how long to *wait* before each event rather than the
//! absolute time at which it happened.  Relative delays make a recording
//! position-independent: the player simply sleeps `delay` milliseconds, emits
//! the event, and moves on.  It never needs to know when the recording began.
//!
//! The recorder reads a monotonic clock for every captured event and asks the
//! [`DelayTracker`] for the delay since the previous record.  The very first
//! record always gets a delay of zero, so playback starts immediately.
//!
//! # Monotonic clock
//!
//! Timestamps passed to [`DelayTracker::next_delay`] are expected to come from
//! `Instant::elapsed()` on a single `Instant`, which never goes backwards.  The
//! tracker still saturates at zero in case a caller feeds an earlier value,
//! so a delay can never underflow.

use std::time::Duration;

/// Computes per-record delays from a monotonic session clock.
#[derive(Debug, Default, Clone)]
pub struct DelayTracker {
    /// Timestamp of the last emitted record, in whole milliseconds since the
    /// session clock started.  `None` until the first record.
    last_ms: Option<u64>,
}

impl DelayTracker {
    /// Creates a tracker that has not yet seen a record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the delay for a record observed at `elapsed` and remembers
    /// `elapsed` as the new reference point.
    ///
    /// The first call returns 0.
    pub fn next_delay(&mut self, elapsed: Duration) -> u64 {
        // Whole-millisecond timestamps keep the sum of all delays equal to the
        // last timestamp, so rounding never accumulates across a long macro.
        let now_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let delay = match self.last_ms {
            None => 0,
            Some(last) => now_ms.saturating_sub(last),
        };
        self.last_ms = Some(now_ms.max(self.last_ms.unwrap_or(0)));
        delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_delay_is_zero_even_when_clock_is_late() {
        // Arrange
        let mut tracker = DelayTracker::new();

        // Act
        let first = tracker.next_delay(Duration::from_millis(5_000));

        // Assert
        assert_eq!(first, 0);
        assert_eq!(tracker.last_ms, Some(5_000));
    }

    #[test]
    fn test_subsequent_delays_are_relative_to_previous_record() {
        // Arrange
        let mut tracker = DelayTracker::new();

        // Act
        let delays: Vec<u64> = [10, 130, 130, 400]
            .iter()
            .map(|ms| tracker.next_delay(Duration::from_millis(*ms)))
            .collect();

        // Assert
        assert_eq!(delays, vec![0, 120, 0, 270]);
    }

    #[test]
    fn test_event_at_time_zero_does_not_reset_the_reference() {
        // Arrange – the first event arrives in the very first millisecond
        let mut tracker = DelayTracker::new();
        tracker.next_delay(Duration::ZERO);

        // Act
        let second = tracker.next_delay(Duration::from_millis(120));

        // Assert
        assert_eq!(second, 120, "a record at 0 ms must still anchor the next delay");
    }

    #[test]
    fn test_earlier_timestamp_saturates_to_zero() {
        // Arrange
        let mut tracker = DelayTracker::new();
        tracker.next_delay(Duration::from_millis(500));

        // Act
        let backwards = tracker.next_delay(Duration::from_millis(200));
        let after = tracker.next_delay(Duration::from_millis(600));

        // Assert
        assert_eq!(backwards, 0);
        assert_eq!(after, 100, "reference point must not move backwards");
    }

    #[test]
    fn test_sub_millisecond_jitter_does_not_accumulate() {
        // Arrange
        let mut tracker = DelayTracker::new();
        let stamps_us = [0u64, 1_400, 2_800, 4_200, 5_600];

        // Act
        let total: u64 = stamps_us
            .iter()
            .map(|us| tracker.next_delay(Duration::from_micros(*us)))
            .sum();

        // Assert – sum of delays equals the last whole-ms timestamp
        assert_eq!(total, 5);
    }
}
