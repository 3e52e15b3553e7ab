//! Failure classification and exponential backoff.
//!
//! Delay before retry `n` (0-based) is `base * 2^n` plus up to
//! `max_jitter` of random jitter, clamped to `max_delay`.

use std::time::Duration;

use rand::Rng;

/// Statuses worth another attempt.
pub const RETRYABLE_STATUSES: &[u16] = &[408, 429, 500, 502, 503, 504];

/// How a failed response should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// 401/403: tear the session down, do not retry.
    Auth,
    /// Transient server-side failure.
    Retryable,
    /// Any other non-success status. Surfaced as-is.
    Client,
}

/// Classify an HTTP status. `None` for 2xx.
pub fn classify_status(status: u16) -> Option<FailureClass> {
    match status {
        200..=299 => None,
        401 | 403 => Some(FailureClass::Auth),
        s if RETRYABLE_STATUSES.contains(&s) => Some(FailureClass::Retryable),
        _ => Some(FailureClass::Client),
    }
}

/// Tunable retry parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            max_jitter: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Total transport calls a request may make.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay before retry `attempt`, ignoring jitter.
    pub fn base_delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Delay before retry `attempt` with an explicit jitter.
    pub fn delay_for(&self, attempt: u32, jitter: Duration) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay
            .saturating_mul(factor)
            .saturating_add(jitter)
            .min(self.max_delay)
    }

    /// Delay before retry `attempt` with random jitter.
    pub fn jittered_delay(&self, attempt: u32) -> Duration {
        let max_jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if max_jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::rng().random_range(0..=max_jitter_ms))
        };
        self.delay_for(attempt, jitter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_statuses() {
        assert_eq!(classify_status(200), None);
        assert_eq!(classify_status(204), None);
        assert_eq!(classify_status(401), Some(FailureClass::Auth));
        assert_eq!(classify_status(403), Some(FailureClass::Auth));
        for status in RETRYABLE_STATUSES {
            assert_eq!(classify_status(*status), Some(FailureClass::Retryable));
        }
        assert_eq!(classify_status(400), Some(FailureClass::Client));
        assert_eq!(classify_status(404), Some(FailureClass::Client));
        assert_eq!(classify_status(501), Some(FailureClass::Client));
    }

    #[test]
    fn base_delay_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.base_delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.base_delay_for(2), Duration::from_secs(4));
    }

    #[test]
    fn base_delay_strictly_increases_across_the_retry_budget() {
        let policy = RetryPolicy::default();
        for a in 0..policy.max_retries {
            for b in (a + 1)..policy.max_retries {
                assert!(policy.base_delay_for(a) < policy.base_delay_for(b), "{a} vs {b}");
            }
        }
    }

    #[test]
    fn every_delay_is_capped() {
        let policy = RetryPolicy::default();
        for attempt in 0..64 {
            assert!(policy.base_delay_for(attempt) <= Duration::from_secs(30));
            assert!(policy.delay_for(attempt, policy.max_jitter) <= Duration::from_secs(30));
            assert!(policy.jittered_delay(attempt) <= Duration::from_secs(30));
        }
    }

    #[test]
    fn jitter_stays_within_bound() {
        let policy = RetryPolicy::default();
        for _ in 0..100 {
            let d = policy.jittered_delay(0);
            assert!(d >= Duration::from_secs(1) && d <= Duration::from_secs(2));
        }
    }

    #[test]
    fn zero_jitter_is_deterministic() {
        let policy = RetryPolicy {
            max_jitter: Duration::ZERO,
            ..Default::default()
        };
        assert_eq!(policy.jittered_delay(1), Duration::from_secs(2));
    }
}
