//! Reconnect backoff.

use std::time::Duration;

/// Exponential backoff with symmetric jitter.
///
/// `delay = min(initial * 2^attempt, max)`, then a uniform offset in
/// `[-jitter, +jitter]` where `jitter = delay * jitter_percent / 100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub jitter_percent: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(30_000),
            jitter_percent: 10,
        }
    }
}

impl Backoff {
    /// Unjittered delay for `attempt` (0-indexed), in milliseconds.
    pub fn base_ms(&self, attempt: u32) -> f64 {
        let exp = attempt.min(1023) as i32;
        let exponential = self.initial_delay.as_millis() as f64 * 2f64.powi(exp);
        exponential.min(self.max_delay.as_millis() as f64)
    }

    /// Jittered delay for `attempt`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.delay_with_sample(attempt, rand::random::<f64>())
    }

    /// Delay for `attempt` given a uniform sample in `[0, 1)`.
    pub fn delay_with_sample(&self, attempt: u32, sample: f64) -> Duration {
        let base = self.base_ms(attempt);
        let jitter = base * (self.jitter_percent as f64 / 100.0);
        let offset = (sample * 2.0 - 1.0) * jitter;
        let final_ms = (base + offset).floor().max(0.0);
        Duration::from_millis(final_ms as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter() -> Backoff {
        Backoff {
            jitter_percent: 0,
            ..Backoff::default()
        }
    }

    #[test]
    fn test_backoff_default() {
        let backoff = Backoff::default();
        assert_eq!(backoff.initial_delay, Duration::from_millis(1000));
        assert_eq!(backoff.max_delay, Duration::from_millis(30_000));
        assert_eq!(backoff.jitter_percent, 10);
    }

    #[test]
    fn test_backoff_doubles_then_caps() {
        let backoff = no_jitter();
        let delays: Vec<u128> = (0..7)
            .map(|a| backoff.delay_for_attempt(a).as_millis())
            .collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000, 30000, 30000]);
        assert_eq!(backoff.delay_for_attempt(u32::MAX).as_millis(), 30000);
    }

    #[test]
    fn test_jitter_extremes() {
        let backoff = Backoff::default();
        assert_eq!(backoff.delay_with_sample(0, 0.0).as_millis(), 900);
        assert_eq!(backoff.delay_with_sample(0, 0.5).as_millis(), 1000);
        assert_eq!(backoff.delay_with_sample(10, 0.0).as_millis(), 27000);
    }

    #[test]
    fn test_jittered_delay_within_bounds() {
        let backoff = Backoff::default();
        let ceiling = (30_000.0 * 1.1) as u128;
        for attempt in 0..12 {
            let base = backoff.base_ms(attempt);
            let jitter = base * 0.1;
            for _ in 0..200 {
                let delay = backoff.delay_for_attempt(attempt).as_millis() as f64;
                assert!(delay >= (base - jitter).floor().max(0.0), "attempt {attempt}: {delay}");
                assert!(delay <= base + jitter, "attempt {attempt}: {delay}");
                assert!(delay as u128 <= ceiling);
            }
        }
    }

    #[test]
    fn test_base_is_non_decreasing() {
        let backoff = Backoff::default();
        let mut previous = 0.0;
        for attempt in 0..64 {
            let base = backoff.base_ms(attempt);
            assert!(base >= previous);
            previous = base;
        }
    }

    #[test]
    fn test_zero_initial_delay_clamps_at_zero() {
        let backoff = Backoff {
            initial_delay: Duration::ZERO,
            ..Backoff::default()
        };
        assert_eq!(backoff.delay_for_attempt(3), Duration::ZERO);
    }
}
