//! Exponential backoff for provider throttling responses.
//!
//! Unlike the per-attempt transient-retry delay, this backoff is a single
//! shared policy across the whole campaign: every consecutive throttling
//! signal doubles the wait, and any successful delivery resets it, since
//! a success means the provider is no longer throttling us.
//!
//! The sequence with the default floor/ceiling is
//! 60s, 120s, 240s, 300s, 300s, ...

use std::time::Duration;

/// Doubling backoff with a floor and a ceiling.
#[derive(Debug, Clone)]
pub struct ThrottleBackoff {
    current: Duration,
    floor: Duration,
    ceiling: Duration,
}

impl ThrottleBackoff {
    /// Create a backoff starting at `floor`, capped at `ceiling`
    #[must_use]
    pub const fn new(floor: Duration, ceiling: Duration) -> Self {
        Self {
            current: floor,
            floor,
            ceiling,
        }
    }

    /// The wait to apply for this throttling event. Doubles the next wait,
    /// clamped to the ceiling.
    pub fn next_wait(&mut self) -> Duration {
        let wait = self.current;
        self.current = self
            .current
            .saturating_mul(2)
            .min(self.ceiling);
        wait
    }

    /// A successful delivery: drop back to the floor.
    pub const fn record_success(&mut self) {
        self.current = self.floor;
    }

    /// The wait the next throttling event would incur, without advancing.
    #[must_use]
    pub const fn peek(&self) -> Duration {
        self.current
    }
}

impl Default for ThrottleBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(60), Duration::from_secs(300))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_monotonic_and_capped() {
        let mut backoff = ThrottleBackoff::default();

        let waits: Vec<u64> = (0..6).map(|_| backoff.next_wait().as_secs()).collect();
        assert_eq!(waits, vec![60, 120, 240, 300, 300, 300]);
    }

    #[test]
    fn test_success_resets_to_floor() {
        let mut backoff = ThrottleBackoff::default();
        backoff.next_wait();
        backoff.next_wait();
        assert_eq!(backoff.peek(), Duration::from_secs(240));

        backoff.record_success();
        assert_eq!(backoff.next_wait(), Duration::from_secs(60));
        assert_eq!(backoff.peek(), Duration::from_secs(120));
    }

    #[test]
    fn test_custom_bounds() {
        let mut backoff = ThrottleBackoff::new(Duration::from_secs(1), Duration::from_secs(5));
        assert_eq!(backoff.next_wait(), Duration::from_secs(1));
        assert_eq!(backoff.next_wait(), Duration::from_secs(2));
        assert_eq!(backoff.next_wait(), Duration::from_secs(4));
        assert_eq!(backoff.next_wait(), Duration::from_secs(5));
        assert_eq!(backoff.next_wait(), Duration::from_secs(5));
    }
}
