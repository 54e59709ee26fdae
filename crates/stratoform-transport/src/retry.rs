//! Retry classification and back-off

use rand::Rng;
use std::time::Duration;

/// Service error codes meaning "accepted, try again later" on a 4xx reply.
pub const RETRY_LATER_CODES: &[&str] = &["APIGW.0308", "SYS.0503"];

/// Retry budget and back-off schedule.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries allowed after the first attempt
    pub max_retries: u32,

    /// Delay before the first retry
    pub initial_delay: Duration,

    /// Upper bound for any single delay
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

/// What to do with the outcome of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Done,
    Retry,
}

impl RetryPolicy {
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// Undithered delay before retry number `retry` (zero-based).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let factor = self.backoff_multiplier.powi(retry.min(32) as i32);
        let millis = self.initial_delay.as_millis() as f64 * factor;
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Jittered delay, uniformly drawn from the upper half of the base delay.
    pub fn jittered_delay(&self, retry: u32) -> Duration {
        let base = self.delay_for_retry(retry).as_millis() as u64;
        if base == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(base / 2..=base))
    }
}

/// Classifies an HTTP status and its service error code.
pub fn classify_status(status: u16, service_code: Option<&str>) -> Verdict {
    match status {
        429 | 502 | 503 | 504 => Verdict::Retry,
        400..=499 if service_code.is_some_and(|c| RETRY_LATER_CODES.contains(&c)) => {
            Verdict::Retry
        }
        _ => Verdict::Done,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_calculation() {
        let policy = RetryPolicy {
            max_retries: 5,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10000),
            backoff_multiplier: 2.0,
        };

        assert_eq!(policy.delay_for_retry(0), Duration::from_millis(1000));
        assert_eq!(policy.delay_for_retry(1), Duration::from_millis(2000));
        assert_eq!(policy.delay_for_retry(2), Duration::from_millis(4000));
        assert_eq!(policy.delay_for_retry(3), Duration::from_millis(8000));
        assert_eq!(policy.delay_for_retry(4), Duration::from_millis(10000)); // capped at max
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = RetryPolicy::with_max_retries(3);
        for retry in 0..4 {
            let base = policy.delay_for_retry(retry);
            let delay = policy.jittered_delay(retry);
            assert!(delay <= base);
            assert!(delay >= base / 2);
        }
    }

    #[test]
    fn test_retryable_statuses() {
        for status in [429, 502, 503, 504] {
            assert_eq!(classify_status(status, None), Verdict::Retry, "{status}");
        }
        for status in [200, 201, 400, 401, 403, 404, 409, 500] {
            assert_eq!(classify_status(status, None), Verdict::Done, "{status}");
        }
    }

    #[test]
    fn test_retry_later_codes() {
        assert_eq!(classify_status(400, Some("APIGW.0308")), Verdict::Retry);
        assert_eq!(classify_status(400, Some("Ecs.0114")), Verdict::Done);
        assert_eq!(classify_status(500, Some("APIGW.0308")), Verdict::Done);
    }
}
