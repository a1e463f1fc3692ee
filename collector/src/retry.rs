//! Bounded retry with exponential backoff.
//!
//! Every upstream call made during a scrape goes through a [`RetryExecutor`]. Transient failures are retried
//! with a delay of `base_delay * multiplier^n`, capped at `max_delay`, until `max_attempts` calls have been
//! made. Terminal failures return immediately. The scrape's cancellation token interrupts both the call in
//! flight and any backoff sleep.

use cloudflare_api_client::UpstreamError;
use std::{
    future::Future,
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use zerotrust_exporter_config::RetryConfig;

/// Classifies failures into "try again" and "give up now".
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for UpstreamError {
    fn is_retryable(&self) -> bool {
        UpstreamError::is_retryable(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total number of calls, the first one included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Growth factor between consecutive delays. Values below 1 are treated as 1.
    pub multiplier: f64,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: config.base_delay,
            multiplier: config.multiplier,
            max_delay: config.max_delay,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (0 for the wait after the first failure).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = self.multiplier.max(1.0).powi(retry.min(i32::MAX as u32) as i32);
        let secs = self.base_delay.as_secs_f64() * factor;
        if !secs.is_finite() || secs >= self.max_delay.as_secs_f64() {
            return self.max_delay;
        }
        Duration::from_secs_f64(secs).min(self.max_delay)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum RetryError<E> {
    #[error("Gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },
    #[error("Non-retryable failure on attempt {attempt}: {error}")]
    Terminal { attempt: u32, error: E },
    #[error("Cancelled after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

impl<E> RetryError<E> {
    /// The last error returned by the operation, unless the loop was cancelled first.
    pub fn last_error(&self) -> Option<&E> {
        match self {
            RetryError::Exhausted { last, .. } => Some(last),
            RetryError::Terminal { error, .. } => Some(error),
            RetryError::Cancelled { .. } => None,
        }
    }
}

/// What a retry loop did, independent of how it ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryReport {
    pub attempts: u32,
    pub delays: Vec<Duration>,
}

impl RetryReport {
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: Result<T, RetryError<E>>,
    pub report: RetryReport,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn execute<T, E, F, Fut>(&self, cancel: &CancellationToken, operation: F) -> Result<T, RetryError<E>>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_with_report(cancel, operation).await.result
    }

    pub async fn execute_with_report<T, E, F, Fut>(
        &self,
        cancel: &CancellationToken,
        mut operation: F,
    ) -> RetryOutcome<T, E>
    where
        E: Retryable + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.policy.attempts();
        let mut report = RetryReport::default();

        loop {
            report.attempts += 1;
            let attempt = report.attempts;

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                result = operation() => Some(result),
            };

            let error = match result {
                None => {
                    return RetryOutcome {
                        result: Err(RetryError::Cancelled { attempts: attempt }),
                        report,
                    }
                }
                Some(Ok(value)) => {
                    return RetryOutcome {
                        result: Ok(value),
                        report,
                    }
                }
                Some(Err(error)) => error,
            };

            if !error.is_retryable() {
                return RetryOutcome {
                    result: Err(RetryError::Terminal { attempt, error }),
                    report,
                };
            }

            if attempt >= max_attempts {
                return RetryOutcome {
                    result: Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: error,
                    }),
                    report,
                };
            }

            let delay = self.policy.delay_for(attempt - 1);
            warn!(attempt, max_attempts, ?delay, %error, "Upstream call failed, retrying...");
            report.delays.push(delay);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    return RetryOutcome {
                        result: Err(RetryError::Cancelled { attempts: attempt }),
                        report,
                    };
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{
        AtomicU32,
        Ordering,
    };

    #[derive(Debug, PartialEq)]
    enum FakeError {
        Flaky(u32),
        Fatal,
    }

    impl std::fmt::Display for FakeError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{self:?}")
        }
    }

    impl Retryable for FakeError {
        fn is_retryable(&self) -> bool {
            matches!(self, FakeError::Flaky(_))
        }
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_millis(300),
        }
    }

    #[test]
    fn delays_grow_and_are_capped() {
        let policy = policy(10);
        let delays: Vec<_> = (0..5).map(|n| policy.delay_for(n)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(300),
                Duration::from_millis(300),
                Duration::from_millis(300),
            ]
        );
        assert_eq!(policy.delay_for(u32::MAX), Duration::from_millis(300));
    }

    #[test]
    fn shrinking_multiplier_is_treated_as_constant() {
        let policy = RetryPolicy {
            multiplier: 0.5,
            ..policy(5)
        };
        assert_eq!(policy.delay_for(0), policy.delay_for(3));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_k_failures() {
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let outcome = RetryExecutor::new(policy(4))
            .execute_with_report(&CancellationToken::new(), || {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if call < 2 {
                        Err(FakeError::Flaky(call))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(outcome.result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(outcome.report.attempts, 3);
        assert_eq!(outcome.report.retries(), 2);
        assert_eq!(
            outcome.report.delays,
            vec![Duration::from_millis(100), Duration::from_millis(200)]
        );
        assert!(outcome.report.delays.windows(2).all(|pair| pair[0] <= pair[1]));
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn returns_last_error_when_exhausted() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = RetryExecutor::new(policy(3))
            .execute(&CancellationToken::new(), || {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(FakeError::Flaky(call)) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(RetryError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last, FakeError::Flaky(2));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_errors_are_not_retried() {
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = RetryExecutor::new(policy(5))
            .execute(&CancellationToken::new(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(FakeError::Fatal) }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(
            result,
            Err(RetryError::Terminal {
                attempt: 1,
                error: FakeError::Fatal
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_attempts_still_calls_once() {
        let calls = AtomicU32::new(0);

        let result = RetryExecutor::new(policy(0))
            .execute(&CancellationToken::new(), || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, FakeError>(1) }
            })
            .await;

        assert_eq!(result.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_the_backoff() {
        let cancel = CancellationToken::new();
        let executor = RetryExecutor::new(RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_secs(60),
            multiplier: 1.0,
            max_delay: Duration::from_secs(60),
        });

        let canceller = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                cancel.cancel();
            })
        };

        let started = tokio::time::Instant::now();
        let result: Result<(), _> = executor
            .execute(&cancel, || async { Err(FakeError::Flaky(0)) })
            .await;
        canceller.await.unwrap();

        assert!(matches!(result, Err(RetryError::Cancelled { attempts: 1 })));
        assert!(started.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_a_hanging_call() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result: Result<(), RetryError<FakeError>> = RetryExecutor::default()
            .execute(&cancel, || std::future::pending())
            .await;

        assert!(matches!(result, Err(RetryError::Cancelled { attempts: 1 })));
    }
}
