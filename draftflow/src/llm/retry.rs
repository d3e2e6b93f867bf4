//! Retry policy with capped exponential backoff and multiplicative jitter.

use crate::errors::GenerationError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Configuration for retry behavior.
///
/// The delay before attempt `n + 1` is
/// `min(base * 2^(n-1), cap) * jitter` with `jitter` drawn uniformly from
/// `[jitter_min, jitter_max]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum attempts (including the first).
    pub max_attempts: u32,
    /// Base delay in milliseconds.
    pub base_delay_ms: u64,
    /// Delay cap in milliseconds (applied before jitter).
    pub max_delay_ms: u64,
    /// Lower jitter factor.
    pub jitter_min: f64,
    /// Upper jitter factor.
    pub jitter_max: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
            jitter_min: 0.8,
            jitter_max: 1.2,
        }
    }
}

/// Outcome of a retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry(Duration),
    /// No more attempts, give up.
    GiveUp,
    /// Don't retry, the error is not retryable.
    NotRetryable,
}

impl RetryPolicy {
    /// Creates a policy with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum attempts.
    #[must_use]
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the delay cap.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the jitter range.
    #[must_use]
    pub fn with_jitter(mut self, min: f64, max: f64) -> Self {
        self.jitter_min = min;
        self.jitter_max = max;
        self
    }

    /// Delay after failed attempt `attempt` (1-based), before jitter.
    #[must_use]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32);
        let delay = self
            .base_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent))
            .min(self.max_delay_ms);
        Duration::from_millis(delay)
    }

    /// Delay after failed attempt `attempt` (1-based), with jitter.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = if self.jitter_max > self.jitter_min {
            rand::thread_rng().gen_range(self.jitter_min..=self.jitter_max)
        } else {
            self.jitter_min
        };
        self.base_delay(attempt).mul_f64(factor.max(0.0))
    }

    /// Decides what to do after attempt `attempt` (1-based) failed with `error`.
    #[must_use]
    pub fn decide(&self, attempt: u32, error: &GenerationError) -> RetryDecision {
        if !error.is_retryable() {
            RetryDecision::NotRetryable
        } else if attempt >= self.max_attempts {
            RetryDecision::GiveUp
        } else {
            RetryDecision::Retry(self.delay_for(attempt))
        }
    }
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// the attempts are used up. Returns the value and the attempts it took.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<(T, u32), GenerationError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, GenerationError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation(attempt).await {
            Ok(value) => return Ok((value, attempt)),
            Err(e) => match policy.decide(attempt, &e) {
                RetryDecision::Retry(delay) => {
                    tracing::debug!(
                        call = %label,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "Retrying after error"
                    );
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp => {
                    tracing::warn!(call = %label, attempts = attempt, error = %e, "Retries exhausted");
                    return Err(e);
                }
                RetryDecision::NotRetryable => {
                    tracing::debug!(call = %label, attempt, error = %e, "Error is not retryable");
                    return Err(e);
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_base_delay_doubles_until_cap() {
        let policy = RetryPolicy::new();
        let delays: Vec<u64> = (1..=8)
            .map(|a| u64::try_from(policy.base_delay(a).as_millis()).unwrap())
            .collect();
        assert_eq!(delays, vec![500, 1000, 2000, 4000, 8000, 8000, 8000, 8000]);
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_jitter_stays_in_range() {
        let policy = RetryPolicy::new();
        for attempt in 1..=6 {
            let base = policy.base_delay(attempt).as_secs_f64();
            for _ in 0..50 {
                let jittered = policy.delay_for(attempt).as_secs_f64();
                assert!(jittered >= base * 0.8 - 1e-9, "{jittered} < 0.8 * {base}");
                assert!(jittered <= base * 1.2 + 1e-9, "{jittered} > 1.2 * {base}");
            }
        }
    }

    #[test]
    fn test_decide() {
        let policy = RetryPolicy::new().with_max_attempts(2);
        let transient = GenerationError::Timeout("slow".into());
        let fatal = GenerationError::provider("bad request", Some(400));

        assert!(matches!(policy.decide(1, &transient), RetryDecision::Retry(_)));
        assert_eq!(policy.decide(2, &transient), RetryDecision::GiveUp);
        assert_eq!(policy.decide(1, &fatal), RetryDecision::NotRetryable);
    }

    #[tokio::test]
    async fn test_with_retry_exhausts_attempts() {
        let policy = RetryPolicy::new().with_max_attempts(3).with_base_delay_ms(1);
        let calls = AtomicU32::new(0);

        let result: Result<((), u32), _> = with_retry(&policy, "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(GenerationError::RateLimited("429".into())) }
        })
        .await;

        assert!(matches!(result, Err(GenerationError::RateLimited(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_retry_stops_on_fatal() {
        let policy = RetryPolicy::new().with_base_delay_ms(1);
        let calls = AtomicU32::new(0);

        let result: Result<((), u32), _> = with_retry(&policy, "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(GenerationError::Config("missing key".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_retry_reports_attempts() {
        let policy = RetryPolicy::new().with_base_delay_ms(1);

        let (value, attempts) = with_retry(&policy, "test", |attempt| async move {
            if attempt < 2 {
                Err(GenerationError::provider("502", Some(502)))
            } else {
                Ok(attempt * 10)
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 20);
        assert_eq!(attempts, 2);
    }
}
