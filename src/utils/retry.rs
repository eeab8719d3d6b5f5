//! Retry with linear backoff for transient fetch failures.

use crate::error::{Result, TraderError};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// How many times to try and how long to wait between attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u8,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u8, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// attempts run out. Waits `base_delay * attempt` between attempts.
pub async fn retry_with_backoff<T, F, Fut>(label: &str, policy: RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut last_error = None;

    for attempt in 1..=policy.max_attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() => {
                warn!(
                    %label,
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %e,
                    "Fetch failed, retrying"
                );
                last_error = Some(e);

                if attempt < policy.max_attempts {
                    tokio::time::sleep(policy.base_delay * attempt as u32).await;
                }
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error.unwrap_or_else(|| TraderError::fetch(label, "no attempts made")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let policy = RetryPolicy::new(3, Duration::from_millis(1));

        let result = retry_with_backoff("book", policy, move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(TraderError::fetch("book", "503"))
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_parse_errors_are_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let policy = RetryPolicy::new(5, Duration::from_millis(1));

        let result: Result<()> = retry_with_backoff("feed", policy, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TraderError::Parse("no table".into()))
        })
        .await;

        assert!(matches!(result, Err(TraderError::Parse(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let policy = RetryPolicy::new(2, Duration::from_millis(1));

        let result: Result<()> = retry_with_backoff("book", policy, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TraderError::fetch("book", "timeout"))
        })
        .await;

        assert!(matches!(result, Err(TraderError::Fetch { .. })));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
