//! Retry/backoff controller
//!
//! Wraps a single provider call in a bounded retry loop. Only failures
//! classified as retryable at the transport boundary (rate limiting) are
//! retried; everything else propagates immediately.

use crate::error::CallError;
use async_trait::async_trait;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Named attempt/delay bounds for retry and poll loops.
///
/// One default is shared by every provider; adapters that need different
/// tuning take a policy at construction instead of burying constants at
/// call sites.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(90),
        }
    }
}

impl RetryPolicy {
    /// Capped exponential delay for the 1-indexed attempt, before jitter.
    pub fn capped_delay(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
        let millis = (self.base_delay.as_millis() as u64).saturating_mul(factor);
        Duration::from_millis(millis.min(self.max_delay.as_millis() as u64))
    }

    /// Delay with jitter: `capped + uniform(0, 0.3 * capped)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let capped = self.capped_delay(attempt);
        let jitter = capped.mul_f64(rand::thread_rng().gen_range(0.0..0.3));
        capped + jitter
    }
}

/// Sleep dependency, injected so tests can observe the schedule without
/// waiting it out.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by the tokio timer.
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Run `operation` with bounded retries under the policy's backoff
/// schedule.
///
/// Retries apply to this one call only, never to a surrounding multi-step
/// action; each step of an action carries its own loop. Exhausting the
/// attempt bound returns the last observed error.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    sleeper: &dyn Sleeper,
    label: &str,
    mut operation: F,
) -> std::result::Result<T, CallError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, CallError>>,
{
    let mut attempt = 1u32;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.retryable && attempt < policy.max_attempts => {
                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(
                    "{label}: rate limited on attempt {attempt}, retrying in {}ms",
                    delay.as_millis()
                );
                sleeper.sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                if err.retryable {
                    tracing::warn!(
                        "{label}: still rate limited after {attempt} attempts, giving up"
                    );
                }
                return Err(err);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Records requested delays instead of sleeping.
    #[derive(Default)]
    pub struct RecordingSleeper {
        pub delays: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Sleeper for RecordingSleeper {
        async fn sleep(&self, duration: Duration) {
            self.delays.lock().unwrap().push(duration);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingSleeper;
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_stays_within_bounds() {
        let policy = RetryPolicy::default();
        for attempt in 1..=25 {
            let capped = policy.capped_delay(attempt);
            let delay = policy.delay_for_attempt(attempt);
            assert!(delay >= capped, "attempt {attempt}: {delay:?} < {capped:?}");
            assert!(
                delay <= capped.mul_f64(1.3),
                "attempt {attempt}: {delay:?} > 1.3 * {capped:?}"
            );
        }
    }

    #[test]
    fn test_backoff_caps_at_max_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.capped_delay(1), Duration::from_secs(1));
        assert_eq!(policy.capped_delay(2), Duration::from_secs(2));
        assert_eq!(policy.capped_delay(7), Duration::from_secs(64));
        assert_eq!(policy.capped_delay(8), Duration::from_secs(90));
        assert_eq!(policy.capped_delay(20), Duration::from_secs(90));
    }

    #[tokio::test]
    async fn test_rate_limited_calls_retry_to_the_bound() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(80),
        };
        let sleeper = RecordingSleeper::default();
        let calls = AtomicU32::new(0);

        let outcome: Result<(), CallError> = with_retry(&policy, &sleeper, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CallError::rate_limited(Some(429), "Too Many Requests")) }
        })
        .await;

        let err = outcome.unwrap_err();
        assert!(err.retryable);
        assert_eq!(err.code, Some(429));
        // max_attempts calls, max_attempts - 1 sleeps
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert_eq!(sleeper.delays.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_fatal_errors_are_never_retried() {
        let policy = RetryPolicy::default();
        let sleeper = RecordingSleeper::default();
        let calls = AtomicU32::new(0);

        let outcome: Result<(), CallError> = with_retry(&policy, &sleeper, "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(CallError::fatal(Some(400), "Bad Request")) }
        })
        .await;

        assert!(!outcome.unwrap_err().retryable);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(sleeper.delays.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_recovers_after_transient_failures() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(80),
        };
        let sleeper = RecordingSleeper::default();
        let calls = AtomicU32::new(0);

        let outcome = with_retry(&policy, &sleeper, "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(CallError::rate_limited(None, "ThrottlingException"))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(outcome.unwrap(), 2);
        assert_eq!(sleeper.delays.lock().unwrap().len(), 2);
    }
}
