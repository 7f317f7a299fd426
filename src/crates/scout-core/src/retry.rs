//! Backoff for transient capability failures
//!
//! Only [`CapabilityError::Transient`] is retried. A rate limit is a pause
//! signal for the whole job, so it is returned to the caller on first sight.

use crate::error::CapabilityError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Upper bound on any single backoff, whatever the policy says
const MAX_DELAY: Duration = Duration::from_secs(3600);

/// Exponential backoff policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the first)
    pub max_attempts: usize,

    /// Initial interval between retries in seconds
    pub initial_interval: f64,

    /// Multiplier for the interval after each retry
    pub backoff_factor: f64,

    /// Maximum interval between retries in seconds
    pub max_interval: f64,

    /// Whether to add random jitter to intervals
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    pub fn with_initial_interval(mut self, seconds: f64) -> Self {
        self.initial_interval = seconds;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    pub fn with_max_interval(mut self, seconds: f64) -> Self {
        self.max_interval = seconds;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Delay before retry number `attempt` (0-indexed), at most one hour
    pub fn calculate_delay(&self, attempt: usize) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base_delay = self.initial_interval * self.backoff_factor.powi(exponent);
        let capped_delay = base_delay
            .min(self.max_interval)
            .min(MAX_DELAY.as_secs_f64())
            .max(0.0);

        let final_delay = if self.jitter {
            let jitter_factor = rand::thread_rng().gen_range(0.5..=1.5);
            capped_delay * jitter_factor
        } else {
            capped_delay
        };

        Duration::try_from_secs_f64(final_delay)
            .map_or(MAX_DELAY, |delay| delay.min(MAX_DELAY))
    }

    /// Whether another attempt is allowed after `attempt` attempts
    pub fn should_retry(&self, attempt: usize) -> bool {
        attempt < self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: 0.5,
            backoff_factor: 2.0,
            max_interval: 30.0,
            jitter: true,
        }
    }
}

/// Run `operation`, retrying transient failures under `policy`
pub async fn with_transient_retry<F, Fut, T>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<T, CapabilityError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CapabilityError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(call = %label, attempt, "Retry succeeded");
                }
                return Ok(value);
            }
            Err(CapabilityError::Transient(message)) if policy.should_retry(attempt) => {
                let delay = policy.calculate_delay(attempt - 1);
                warn!(
                    call = %label,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %message,
                    "Transient failure, will retry"
                );
                sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RateLimitSignal;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fast() -> RetryPolicy {
        RetryPolicy::new(3)
            .with_initial_interval(0.001)
            .with_max_interval(0.01)
            .with_jitter(false)
    }

    #[test]
    fn test_delay_is_exponential_and_capped() {
        let policy = RetryPolicy::new(10)
            .with_initial_interval(1.0)
            .with_backoff_factor(2.0)
            .with_max_interval(5.0)
            .with_jitter(false);
        assert_eq!(policy.calculate_delay(0), Duration::from_secs(1));
        assert_eq!(policy.calculate_delay(1), Duration::from_secs(2));
        assert_eq!(policy.calculate_delay(5), Duration::from_secs(5));
    }

    #[test]
    fn test_unbounded_policy_is_clamped() {
        let infinite = RetryPolicy::new(3)
            .with_initial_interval(f64::MAX)
            .with_max_interval(f64::INFINITY);
        assert_eq!(infinite.calculate_delay(0), MAX_DELAY);
        assert_eq!(infinite.with_jitter(false).calculate_delay(usize::MAX), MAX_DELAY);

        let nonsense = RetryPolicy::new(3)
            .with_initial_interval(f64::NAN)
            .with_max_interval(f64::NAN)
            .with_jitter(false);
        assert_eq!(nonsense.calculate_delay(2), Duration::ZERO);
    }

    #[test]
    fn test_jitter_stays_in_band() {
        let policy = RetryPolicy::new(3).with_initial_interval(2.0).with_jitter(true);
        for _ in 0..20 {
            let delay = policy.calculate_delay(0).as_secs_f64();
            assert!((1.0..=3.0).contains(&delay));
        }
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let result = with_transient_retry(&fast(), "search", || {
            let counter = counter.clone();
            async move {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(CapabilityError::Transient("503".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let result: Result<(), _> = with_transient_retry(&fast(), "scrape", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(CapabilityError::Transient("timeout".into()))
            }
        })
        .await;
        assert!(matches!(result, Err(CapabilityError::Transient(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_rate_limit_is_never_retried() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let result: Result<(), _> = with_transient_retry(&fast(), "enrich", || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(CapabilityError::RateLimited(RateLimitSignal::new(
                    "enrich",
                    Utc::now(),
                    "quota",
                )))
            }
        })
        .await;
        assert!(matches!(result, Err(CapabilityError::RateLimited(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
