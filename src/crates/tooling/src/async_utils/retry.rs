//! Bounded exponential backoff
//!
//! Model-provider transports fail transiently; the execution core surfaces
//! those errors without retrying. Callers that want retries wrap the call:
//!
//! ```rust
//! use tooling::async_utils::retry::{retry, RetryPolicy};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let policy = RetryPolicy::default().with_max_attempts(3);
//! let result: Result<i32, String> = retry(&policy, || async { Ok(7) }).await;
//! assert_eq!(result.unwrap(), 7);
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

/// Backoff configuration.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, first call included
    pub max_attempts: usize,
    /// Delay before the first retry
    pub initial_interval: Duration,
    /// Multiplier applied per retry
    pub backoff_factor: f64,
    /// Cap on any single delay
    pub max_interval: Duration,
    /// Add up to 25% random jitter to each delay
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_interval: Duration::from_millis(200),
            backoff_factor: 2.0,
            max_interval: Duration::from_secs(10),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Override the attempt bound.
    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Disable jitter (deterministic delays, mostly for tests).
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// The delay before retry number `attempt` (1-indexed).
    pub fn delay(&self, attempt: usize) -> Duration {
        let factor = self.backoff_factor.powi(attempt.saturating_sub(1) as i32);
        let base = self.initial_interval.as_secs_f64() * factor;
        let capped = base.min(self.max_interval.as_secs_f64());
        let final_delay = if self.jitter {
            use rand::Rng;
            capped * (1.0 + rand::thread_rng().gen_range(0.0..0.25))
        } else {
            capped
        };
        Duration::from_secs_f64(final_delay)
    }
}

/// Run `operation`, retrying failures per `policy`.
///
/// Returns the first success, or the last error once attempts are
/// exhausted.
pub async fn retry<F, Fut, T, E>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempt, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) if attempt < policy.max_attempts => {
                let delay = policy.delay(attempt);
                tracing::warn!(attempt, delay_ms = delay.as_millis() as u64, error = %error, "retrying after failure");
                tokio::time::sleep(delay).await;
            }
            Err(error) => {
                tracing::error!(attempt, error = %error, "giving up after final attempt");
                return Err(error);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn fail_n_times(failures: usize) -> (Arc<AtomicUsize>, impl FnMut() -> std::pin::Pin<Box<dyn Future<Output = Result<usize, String>> + Send>>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let op = move || {
            let counter = Arc::clone(&counter);
            Box::pin(async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n < failures {
                    Err(format!("failure {n}"))
                } else {
                    Ok(n + 1)
                }
            }) as std::pin::Pin<Box<dyn Future<Output = Result<usize, String>> + Send>>
        };
        (calls, op)
    }

    fn fast_policy(attempts: usize) -> RetryPolicy {
        RetryPolicy {
            max_attempts: attempts,
            initial_interval: Duration::from_millis(1),
            backoff_factor: 2.0,
            max_interval: Duration::from_millis(4),
            jitter: false,
        }
    }

    #[tokio::test]
    async fn test_succeeds_first_try() {
        let (calls, op) = fail_n_times(0);
        let result = retry(&fast_policy(3), op).await;
        assert_eq!(result.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recovers_after_failures() {
        let (calls, op) = fail_n_times(2);
        let result = retry(&fast_policy(3), op).await;
        assert!(result.is_ok(), "third attempt should succeed");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_attempts() {
        let (calls, op) = fail_n_times(10);
        let result = retry(&fast_policy(3), op).await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3, "exactly max_attempts calls");
    }

    #[test]
    fn test_delay_progression_and_cap() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_interval: Duration::from_millis(100),
            backoff_factor: 2.0,
            max_interval: Duration::from_millis(300),
            jitter: false,
        };
        assert_eq!(policy.delay(1), Duration::from_millis(100));
        assert_eq!(policy.delay(2), Duration::from_millis(200));
        assert_eq!(policy.delay(3), Duration::from_millis(300), "capped at max_interval");
        assert_eq!(policy.delay(4), Duration::from_millis(300));
    }

    #[test]
    fn test_jitter_bounds() {
        let policy = RetryPolicy {
            jitter: true,
            initial_interval: Duration::from_millis(100),
            backoff_factor: 1.0,
            ..RetryPolicy::default()
        };
        for _ in 0..50 {
            let d = policy.delay(1).as_secs_f64();
            assert!((0.1..=0.125).contains(&d), "jittered delay {d} out of bounds");
        }
    }
}
