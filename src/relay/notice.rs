//! NOTICE rate limiting.
//!
//! A relay can flood the client with diagnostic text. At most `limit`
//! notices are admitted per rolling `window`; the rest are dropped.
//!
//! Entries are keyed by the exact notice text, so a repeated text refreshes
//! its own timestamp instead of taking a second slot.

use std::collections::HashMap;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug)]
pub struct NoticeLimiter {
    limit: usize,
    window: Duration,
    seen: HashMap<String, Instant>,
}

impl NoticeLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            seen: HashMap::new(),
        }
    }

    /// Whether `message`, arriving at `now`, may be emitted.
    pub fn admit(&mut self, message: &str, now: Instant) -> bool {
        let recent = self
            .seen
            .values()
            .filter(|ts| now.saturating_duration_since(**ts) < self.window)
            .count();

        if recent >= self.limit {
            return false;
        }

        self.seen.insert(message.to_string(), now);

        let window = self.window;
        self.seen
            .retain(|_, ts| now.saturating_duration_since(*ts) <= window);

        true
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.seen.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);

    #[test]
    fn test_eleven_distinct_notices_admit_ten() {
        let mut limiter = NoticeLimiter::new(10, WINDOW);
        let start = Instant::now();
        let admitted = (0..11)
            .filter(|i| limiter.admit(&format!("notice {i}"), start + Duration::from_millis(*i)))
            .count();
        assert_eq!(admitted, 10);
        assert_eq!(limiter.tracked(), 10);
    }

    #[test]
    fn test_window_rolls_over() {
        let mut limiter = NoticeLimiter::new(2, WINDOW);
        let start = Instant::now();
        assert!(limiter.admit("a", start));
        assert!(limiter.admit("b", start));
        assert!(!limiter.admit("c", start + Duration::from_secs(30)));
        assert!(limiter.admit("c", start + Duration::from_secs(61)));
        // "a" and "b" were pruned on the admitted call
        assert_eq!(limiter.tracked(), 1);
    }

    #[test]
    fn test_repeated_text_shares_a_slot() {
        let mut limiter = NoticeLimiter::new(2, WINDOW);
        let start = Instant::now();
        for i in 0..5 {
            assert!(limiter.admit("same", start + Duration::from_secs(i)));
        }
        assert_eq!(limiter.tracked(), 1);
        assert!(limiter.admit("other", start + Duration::from_secs(5)));
        assert!(!limiter.admit("third", start + Duration::from_secs(6)));
    }

    #[test]
    fn test_dropped_notice_does_not_refresh() {
        let mut limiter = NoticeLimiter::new(1, WINDOW);
        let start = Instant::now();
        assert!(limiter.admit("a", start));
        assert!(!limiter.admit("a", start + Duration::from_secs(59)));
        assert!(limiter.admit("a", start + Duration::from_secs(60)));
    }
}
