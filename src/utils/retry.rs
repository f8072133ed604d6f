use std::future::Future;
use std::time::Duration;

/// `base * 2^attempt`, attempt counted from zero.
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1u32 << attempt.min(16))
}

pub struct RetryOutcome<T, E> {
    pub result: Result<T, E>,
    pub attempts: u32,
}

/// Runs `operation` until it succeeds, fails with an error `is_retryable`
/// rejects, or `max_attempts` is reached, sleeping with exponential backoff
/// in between.
pub async fn retry_async<T, E, F, Fut, R>(
    max_attempts: u32,
    base_delay: Duration,
    is_retryable: R,
    mut operation: F,
) -> RetryOutcome<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    R: Fn(&E) -> bool,
    E: std::fmt::Display,
{
    let max_attempts = max_attempts.max(1);
    let mut attempt = 0;
    loop {
        match operation(attempt).await {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt + 1,
                }
            }
            Err(err) if attempt + 1 < max_attempts && is_retryable(&err) => {
                let delay = backoff_delay(base_delay, attempt);
                tracing::warn!(
                    attempt = attempt + 1,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "operation failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                return RetryOutcome {
                    result: Err(err),
                    attempts: attempt + 1,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn delays_double_each_attempt() {
        let base = Duration::from_millis(100);
        assert_eq!(backoff_delay(base, 0), Duration::from_millis(100));
        assert_eq!(backoff_delay(base, 1), Duration::from_millis(200));
        assert_eq!(backoff_delay(base, 4), Duration::from_millis(1600));
    }

    #[tokio::test]
    async fn stops_after_first_success() {
        let calls = Cell::new(0);
        let outcome = retry_async(5, Duration::from_millis(1), |_| true, |attempt| {
            calls.set(calls.get() + 1);
            async move {
                if attempt < 2 {
                    Err("smtp timeout")
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;
        assert_eq!(outcome.result, Ok(2));
        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.get(), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let outcome: RetryOutcome<(), &str> =
            retry_async(3, Duration::from_millis(1), |_| true, |_| async { Err("refused") }).await;
        assert_eq!(outcome.result, Err("refused"));
        assert_eq!(outcome.attempts, 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let calls = Cell::new(0);
        let outcome: RetryOutcome<(), &str> = retry_async(
            5,
            Duration::from_millis(1),
            |err: &&str| !err.starts_with("550"),
            |_| {
                calls.set(calls.get() + 1);
                async { Err("550 mailbox unavailable") }
            },
        )
        .await;
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.get(), 1);
    }
}
