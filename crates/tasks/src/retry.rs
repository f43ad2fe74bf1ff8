//! Bounded retry with backoff around a single async operation.

use std::future::Future;

use tracing::{debug, warn};

use agrochain_core::{TaskError, TaskResult};

use crate::types::RetryPolicy;

/// Wraps one async operation with bounded retries.
///
/// Stateless between calls: the executor holds only its policy, so a single
/// instance may serve any number of concurrent independent invocations.
#[derive(Debug, Clone, Default)]
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

    /// Run `operation` until it succeeds or the attempt budget is spent.
    ///
    /// The operation must be re-invokable; it is called once per attempt.
    /// `context` is a diagnostic label only, carried into the terminal
    /// [`TaskError::RetryExhausted`] together with the last underlying error.
    pub async fn execute<T, F, Fut>(&self, operation: F, context: &str) -> TaskResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        // max_attempts of 0 would mean "never run"; clamp to one attempt.
        let max_attempts = self.policy.max_attempts.max(1);
        let mut last_error: Option<anyhow::Error> = None;

        for attempt in 1..=max_attempts {
            match operation().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(context, attempt, "operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    warn!(context, attempt, error = %err, "operation attempt failed");
                    last_error = Some(err);
                    if attempt == max_attempts {
                        break;
                    }
                    tokio::time::sleep(self.policy.delay_for_attempt(attempt)).await;
                }
            }
        }

        Err(TaskError::retry_exhausted(
            context,
            max_attempts,
            last_error.unwrap_or_else(|| anyhow::anyhow!("operation never produced an error")),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use super::*;

    fn counter() -> Arc<AtomicU32> {
        Arc::new(AtomicU32::new(0))
    }

    #[tokio::test(start_paused = true)]
    async fn always_failing_operation_runs_exactly_max_attempts_times() {
        let calls = counter();
        let executor = RetryExecutor::default();

        let c = calls.clone();
        let result: TaskResult<()> = executor
            .execute(
                move || {
                    let c = c.clone();
                    async move {
                        c.fetch_add(1, Ordering::SeqCst);
                        Err(anyhow::anyhow!("rpc unreachable"))
                    }
                },
                "mint product",
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(TaskError::RetryExhausted {
                context, attempts, ..
            }) => {
                assert_eq!(context, "mint product");
                assert_eq!(attempts, 3);
            }
            other => panic!("expected RetryExhausted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_second_attempt_after_one_failure() {
        let calls = counter();
        let executor = RetryExecutor::default();

        let c = calls.clone();
        let result = executor
            .execute(
                move || {
                    let c = c.clone();
                    async move {
                        if c.fetch_add(1, Ordering::SeqCst) == 0 {
                            Err(anyhow::anyhow!("transient"))
                        } else {
                            Ok(42u64)
                        }
                    }
                },
                "transfer",
            )
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn max_attempts_one_means_a_single_attempt() {
        let calls = counter();
        let executor = RetryExecutor::new(RetryPolicy {
            max_attempts: 1,
            ..Default::default()
        });

        let c = calls.clone();
        let result: TaskResult<()> = executor
            .execute(
                move || {
                    let c = c.clone();
                    async move {
                        c.fetch_add(1, Ordering::SeqCst);
                        Err(anyhow::anyhow!("boom"))
                    }
                },
                "list product",
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(TaskError::RetryExhausted { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn zero_max_attempts_is_clamped_to_one() {
        let calls = counter();
        let executor = RetryExecutor::new(RetryPolicy {
            max_attempts: 0,
            ..Default::default()
        });

        let c = calls.clone();
        let result = executor
            .execute(
                move || {
                    let c = c.clone();
                    async move {
                        c.fetch_add(1, Ordering::SeqCst);
                        Ok("done")
                    }
                },
                "noop",
            )
            .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_delays_follow_the_policy() {
        let executor = RetryExecutor::new(RetryPolicy::exponential(
            3,
            Duration::from_millis(1000),
            Duration::from_millis(5000),
        ));

        let start = tokio::time::Instant::now();
        let result: TaskResult<()> = executor
            .execute(|| async { Err(anyhow::anyhow!("down")) }, "buy product")
            .await;

        assert!(result.is_err());
        // Two retries: 1000ms after the first failure, 2000ms after the second.
        assert_eq!(start.elapsed(), Duration::from_millis(3000));
    }
}
