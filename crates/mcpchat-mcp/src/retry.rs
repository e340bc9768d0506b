//! Retry policy for tool invocation.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use mcpchat_core::RetryConfig;
use tracing::{debug, warn};

/// How many times to attempt an operation and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts; 0 behaves as 1.
    pub max_attempts: u32,
    /// Wait after each failed attempt except the last.
    pub delay: Duration,
    /// Upper bound of random extra wait added to `delay`.
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            jitter: Duration::ZERO,
        }
    }

    /// A single attempt, no waiting.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        let delay = Duration::try_from_secs_f64(config.delay_secs).unwrap_or_default();
        let jitter = Duration::from_millis(config.jitter_ms.unwrap_or(0));
        Self::new(config.attempts, delay).with_jitter(jitter)
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    fn backoff(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.delay;
        }
        let extra = fastrand::u64(0..=self.jitter.as_millis() as u64);
        self.delay + Duration::from_millis(extra)
    }

    /// Run `op` until it succeeds or the attempts are used up.
    ///
    /// `op` receives the 1-based attempt number. Sleeps happen only between a
    /// failure and the next attempt, never after the final one.
    pub async fn run<F, Fut, T, E>(&self, label: &str, mut op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let max_attempts = self.attempts();
        let mut attempt = 1;

        loop {
            debug!(label, attempt, max_attempts, "Attempting operation");
            match op(attempt).await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < max_attempts => {
                    let wait = self.backoff();
                    warn!(
                        label,
                        attempt,
                        max_attempts,
                        wait_ms = wait.as_millis() as u64,
                        error = %err,
                        "Attempt failed, retrying"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(err) => {
                    warn!(label, attempt, max_attempts, error = %err, "Final attempt failed");
                    return Err(RetryError {
                        attempts: attempt,
                        last: err,
                    });
                }
            }
        }
    }
}

/// All attempts failed; `last` is the final attempt's error.
#[derive(Debug)]
pub struct RetryError<E> {
    pub attempts: u32,
    pub last: E,
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed after {} attempt(s): {}", self.attempts, self.last)
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RetryError<E> {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_third_attempt_after_two_sleeps() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result: Result<&str, RetryError<String>> = policy
            .run("flaky", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(format!("attempt {} failed", attempt))
                    } else {
                        Ok("third")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "third");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_attempt_never_sleeps() {
        let policy = RetryPolicy::new(1, Duration::from_secs(5));
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let err = policy
            .run("broken", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>("boom") }
            })
            .await
            .unwrap_err();

        assert_eq!(err.attempts, 1);
        assert_eq!(err.last, "boom");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_reports_last_error() {
        let policy = RetryPolicy::new(2, Duration::from_millis(250));
        let start = Instant::now();

        let err = policy
            .run("always", |attempt| async move { Err::<(), _>(format!("e{}", attempt)) })
            .await
            .unwrap_err();

        assert_eq!(err.attempts, 2);
        assert_eq!(err.last, "e2");
        assert_eq!(start.elapsed(), Duration::from_millis(250));
        assert_eq!(err.to_string(), "failed after 2 attempt(s): e2");
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_runs_once() {
        let policy = RetryPolicy::new(0, Duration::from_secs(1));
        let calls = AtomicU32::new(0);
        let _ = policy
            .run("zero", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>("no") }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_jitter_stays_within_bound() {
        let policy = RetryPolicy::new(2, Duration::from_millis(100)).with_jitter(Duration::from_millis(50));
        let start = Instant::now();
        let _ = policy
            .run("jitter", |_| async { Err::<(), _>("no") })
            .await;
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(100));
        assert!(elapsed <= Duration::from_millis(150));
    }

    #[test]
    fn test_from_config() {
        let config = RetryConfig {
            attempts: 3,
            delay_secs: 0.5,
            jitter_ms: Some(20),
        };
        let policy = RetryPolicy::from_config(&config);
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay, Duration::from_millis(500));
        assert_eq!(policy.jitter, Duration::from_millis(20));

        let negative = RetryConfig {
            delay_secs: -1.0,
            ..Default::default()
        };
        assert_eq!(RetryPolicy::from_config(&negative).delay, Duration::ZERO);
    }
}
