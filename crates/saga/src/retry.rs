//! Bounded retries for idempotent remote reads.

use std::future::Future;
use std::time::Duration;

use backon::{BackoffBuilder, Retryable};

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Retry immediately.
    None,
    /// Wait `step`, then `2 × step`, then `3 × step`, ...
    Linear(Duration),
}

impl Backoff {
    /// Delay after the given failed attempt (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match self {
            Backoff::None => Duration::ZERO,
            Backoff::Linear(step) => step.saturating_mul(attempt),
        }
    }
}

/// How many times to try an operation and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    /// Three attempts, waiting 1s then 2s.
    pub fn product_lookup() -> Self {
        Self {
            max_attempts: 3,
            backoff: Backoff::Linear(Duration::from_secs(1)),
        }
    }

    /// A single attempt.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            backoff: Backoff::None,
        }
    }

    /// The delay schedule for this policy as a `backon` builder.
    pub fn builder(&self) -> LinearBuilder {
        LinearBuilder {
            backoff: self.backoff,
            retries: self.max_attempts.saturating_sub(1),
        }
    }

    /// Runs `op` until it succeeds, fails with an error `is_retryable`
    /// rejects, or the attempts run out. The last error is returned.
    pub async fn retry<T, E, F, Fut>(&self, op: F, is_retryable: impl Fn(&E) -> bool) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        op.retry(self.builder())
            .sleep(tokio::time::sleep)
            .when(is_retryable)
            .notify(|_, delay: Duration| {
                tracing::debug!(?delay, "retrying after transient failure");
            })
            .await
    }
}

/// Builds the linear schedule of a [`RetryPolicy`]: one delay per retry.
#[derive(Debug, Clone, Copy)]
pub struct LinearBuilder {
    backoff: Backoff,
    retries: u32,
}

impl BackoffBuilder for LinearBuilder {
    type Backoff = LinearBackoff;

    fn build(self) -> Self::Backoff {
        LinearBackoff {
            backoff: self.backoff,
            retries: self.retries,
            attempt: 0,
        }
    }
}

/// Yields `backoff.delay(1)`, `backoff.delay(2)`, ... until the retries run out.
#[derive(Debug)]
pub struct LinearBackoff {
    backoff: Backoff,
    retries: u32,
    attempt: u32,
}

impl Iterator for LinearBackoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if self.attempt >= self.retries {
            return None;
        }
        self.attempt += 1;
        Some(self.backoff.delay(self.attempt))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::product_lookup()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn linear_backoff_grows_by_step() {
        let backoff = Backoff::Linear(Duration::from_secs(1));
        assert_eq!(backoff.delay(1), Duration::from_secs(1));
        assert_eq!(backoff.delay(2), Duration::from_secs(2));
        assert_eq!(Backoff::None.delay(5), Duration::ZERO);
    }

    #[test]
    fn product_lookup_schedule_is_one_then_two_seconds() {
        let delays: Vec<Duration> = RetryPolicy::product_lookup().builder().build().collect();
        assert_eq!(delays, vec![Duration::from_secs(1), Duration::from_secs(2)]);
        assert_eq!(RetryPolicy::once().builder().build().count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_transient_errors_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let started = tokio::time::Instant::now();

        let result: Result<u32, &str> = RetryPolicy::product_lookup()
            .retry(
                || {
                    let calls = calls.clone();
                    async move {
                        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                        if n < 3 { Err("flaky") } else { Ok(n) }
                    }
                },
                |_| true,
            )
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), &str> = RetryPolicy::product_lookup()
            .retry(
                || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err("down")
                    }
                },
                |_| true,
            )
            .await;

        assert_eq!(result, Err("down"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn stops_on_non_retryable_error() {
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), &str> = RetryPolicy::product_lookup()
            .retry(
                || {
                    let calls = calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Err("not found")
                    }
                },
                |_| false,
            )
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
