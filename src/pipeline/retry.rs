//! Linear-backoff retry of a whole unit of work

use crate::cancellation::CancellationScope;
use crate::error::{IngestError, Result};
use crate::logging::Logger;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    output: Logger,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, output: Logger) -> Self {
        Self {
            max_attempts,
            base_delay,
            output,
        }
    }

    /// Pause after the given failed attempt: `attempt * base_delay`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    /// Run `operation` up to `max_attempts` times.
    ///
    /// The closure receives the 1-based attempt number. Cancellation ends the
    /// loop immediately; any other error is retried until attempts run out,
    /// then the last error is returned.
    pub async fn run<T, F, Fut>(&self, scope: &CancellationScope, label: &str, mut operation: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            scope.check()?;

            match operation(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        self.output
                            .detail(&format!("{} succeeded on attempt {}", label, attempt));
                    }
                    return Ok(value);
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) if attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    self.output.warning(&format!(
                        "{} attempt {}/{} failed: {}. Retrying in {}ms",
                        label,
                        attempt,
                        self.max_attempts,
                        e,
                        delay.as_millis()
                    ));
                    last_error = Some(e);
                    scope.sleep(delay).await?;
                }
                Err(e) => {
                    self.output.error(&format!(
                        "{} failed after {} attempts: {}",
                        label, self.max_attempts, e
                    ));
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            IngestError::Validation("Retry policy allows no attempts".to_string())
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1), Logger::new_quiet())
    }

    #[test]
    fn test_linear_delay() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1), Logger::new_quiet());
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result = policy(3)
            .run(&CancellationScope::new(), "op", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 3 {
                        Err(IngestError::Upload("flaky".into()))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_attempts_are_capped() {
        // Would succeed on a fourth attempt, which never happens
        let calls = AtomicU32::new(0);
        let result: Result<u32> = policy(3)
            .run(&CancellationScope::new(), "op", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt <= 3 {
                        Err(IngestError::Registration(format!("failure {}", attempt)))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result, Err(IngestError::Registration("failure 3".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancellation_short_circuits() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = policy(5)
            .run(&CancellationScope::new(), "op", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(IngestError::Cancelled) }
            })
            .await;

        assert_eq!(result, Err(IngestError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancelled_scope_runs_nothing() {
        let scope = CancellationScope::new();
        scope.cancel();
        let calls = AtomicU32::new(0);
        let result: Result<()> = policy(3)
            .run(&scope, "op", |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .await;

        assert_eq!(result, Err(IngestError::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
