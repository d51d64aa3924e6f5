//! Fixed-delay retry for collaborator calls.
//!
//! Every call site that retries (search backends, company verification,
//! relevance scoring, profile generation) goes through
//! [`retry_with_backoff`] with its own [`RetryPolicy`].

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::Result;

/// How many times to attempt an operation and how long to wait in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Treated as at least 1.
    pub attempts: u32,
    /// Sleep between consecutive attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// Policy with the delay given in milliseconds.
    pub const fn fixed_ms(attempts: u32, delay_ms: u64) -> Self {
        Self::new(attempts, Duration::from_millis(delay_ms))
    }
}

/// Run `op` until it succeeds or the policy's attempts are used up.
///
/// `op` receives the 1-based attempt number. The delay is slept between
/// attempts only, never after the last one. Returns the first `Ok`, or the
/// error of the final attempt.
pub async fn retry_with_backoff<T, F, Fut>(policy: RetryPolicy, label: &str, mut op: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;

    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts => {
                warn!(label, attempt, attempts, error = %e, "attempt failed, retrying");
                if !policy.delay.is_zero() {
                    tokio::time::sleep(policy.delay).await;
                }
                attempt += 1;
            }
            Err(e) => {
                warn!(label, attempts, error = %e, "all attempts failed");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::error::QualifierError;

    #[tokio::test]
    async fn returns_first_success() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(RetryPolicy::fixed_ms(3, 1), "test", |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 2 {
                    Err(QualifierError::parse("not yet"))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn stops_after_configured_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_with_backoff(RetryPolicy::fixed_ms(2, 1), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(QualifierError::parse("garbage")) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn zero_attempts_still_runs_once() {
        let calls = AtomicU32::new(0);
        let _ = retry_with_backoff(RetryPolicy::new(0, Duration::ZERO), "test", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>(QualifierError::Network("down".into())) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sleeps_between_attempts_only() {
        let start = std::time::Instant::now();
        let _: Result<()> = retry_with_backoff(RetryPolicy::fixed_ms(2, 200), "test", |_| async {
            Err(QualifierError::Network("down".into()))
        })
        .await;
        let elapsed = start.elapsed();
        // One sleep for two attempts; a trailing sleep would double it.
        assert!(elapsed >= Duration::from_millis(200));
        assert!(elapsed < Duration::from_millis(390));
    }
}
