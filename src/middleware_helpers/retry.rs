use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Factor to multiply delay by after each attempt
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_factor: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay to wait after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        Duration::from_secs_f64(secs.min(self.max_delay.as_secs_f64()))
    }
}

/// Decides whether a failed attempt is worth repeating.
pub trait RetryPolicy<E> {
    fn is_retryable(&self, error: &E) -> bool;
}

/// Result of a retried operation together with how many attempts it took.
#[derive(Debug)]
pub struct RetryReport<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
}

/// Execute an async operation with exponential backoff between attempts.
pub async fn with_retry<F, Fut, T, E, P>(
    config: &RetryConfig,
    policy: &P,
    mut operation: F,
) -> RetryReport<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: RetryPolicy<E> + ?Sized,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;

        match operation().await {
            Ok(value) => {
                if attempts > 1 {
                    debug!(attempts, "operation succeeded after retry");
                }
                return RetryReport {
                    result: Ok(value),
                    attempts,
                };
            }
            Err(error) => {
                if attempts >= max_attempts || !policy.is_retryable(&error) {
                    warn!(attempts, error = %error, "operation failed, giving up");
                    return RetryReport {
                        result: Err(error),
                        attempts,
                    };
                }

                let delay = config.delay_after(attempts);
                warn!(attempts, error = %error, delay_ms = delay.as_millis() as u64, "attempt failed, retrying");
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Always;
    impl RetryPolicy<String> for Always {
        fn is_retryable(&self, _: &String) -> bool {
            true
        }
    }

    struct Never;
    impl RetryPolicy<String> for Never {
        fn is_retryable(&self, _: &String) -> bool {
            false
        }
    }

    fn fast() -> RetryConfig {
        RetryConfig {
            max_attempts: 4,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            backoff_factor: 2.0,
        }
    }

    #[test]
    fn delay_grows_and_caps() {
        let config = RetryConfig {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(300),
            backoff_factor: 2.0,
        };
        assert_eq!(config.delay_after(1), Duration::from_millis(100));
        assert_eq!(config.delay_after(2), Duration::from_millis(200));
        assert_eq!(config.delay_after(3), Duration::from_millis(300));
        assert_eq!(config.delay_after(9), Duration::from_millis(300));
    }

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let report = with_retry(&fast(), &Always, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err("transient".to_string())
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(report.result, Ok(2));
        assert_eq!(report.attempts, 3);
    }

    #[tokio::test]
    async fn stops_on_non_retryable_error() {
        let report: RetryReport<(), String> =
            with_retry(&fast(), &Never, || async { Err("rejected".to_string()) }).await;
        assert_eq!(report.attempts, 1);
        assert!(report.result.is_err());
    }

    #[tokio::test]
    async fn gives_up_at_max_attempts() {
        let report: RetryReport<(), String> =
            with_retry(&fast(), &Always, || async { Err("down".to_string()) }).await;
        assert_eq!(report.attempts, 4);
    }
}
