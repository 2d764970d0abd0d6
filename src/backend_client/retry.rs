//! Exponential backoff with jitter (§4.4), grounded on
//! `anthropic_client/src/retry.rs` and `anthropic-async`'s `client.rs` retry loop.

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;

use super::error::BackendError;

const MAX_RETRIES: u32 = 3;

/// Matches §4.4: start at 500ms, double each attempt, ±20% jitter.
/// Count (not elapsed time) bounds the loop, so `max_elapsed_time` is unset.
#[must_use]
pub fn default_backoff() -> backoff::ExponentialBackoff {
    backoff::ExponentialBackoff {
        initial_interval: Duration::from_millis(500),
        multiplier: 2.0,
        randomization_factor: 0.2,
        max_interval: Duration::from_secs(30),
        max_elapsed_time: None,
        ..Default::default()
    }
}

/// Retries `attempt` up to 3 additional times on a retryable `BackendError`,
/// honoring a `Retry-After` hint over the computed backoff delay when present.
/// Non-retryable errors (auth, bad request, protocol) return immediately.
pub async fn retry_with_backoff<F, Fut, T>(mut attempt: F) -> Result<T, BackendError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BackendError>>,
{
    let mut backoff = default_backoff();
    let mut attempts = 0;

    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) if err.retryable && attempts < MAX_RETRIES => {
                let delay = err
                    .retry_after
                    .unwrap_or_else(|| backoff.next_backoff().unwrap_or(Duration::from_secs(10)));
                tracing::warn!(
                    attempt = attempts + 1,
                    delay_ms = delay.as_millis() as u64,
                    kind = ?err.kind,
                    "retrying backend call"
                );
                tokio::time::sleep(delay).await;
                attempts += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend_client::error::BackendErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_without_retry_on_first_try() {
        let calls = AtomicU32::new(0);
        let result: Result<&str, BackendError> = retry_with_backoff(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok("ok") }
        })
        .await;
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_up_to_three_times_then_gives_up() {
        let calls = AtomicU32::new(0);
        let result: Result<&str, BackendError> = retry_with_backoff(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                let mut err = BackendError::server_error(500);
                err.retry_after = Some(Duration::from_millis(1));
                Err(err)
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4); // 1 initial + 3 retries
    }

    #[tokio::test]
    async fn non_retryable_error_returns_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<&str, BackendError> = retry_with_backoff(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(BackendError::auth(401)) }
        })
        .await;
        assert_eq!(result.unwrap_err().kind, BackendErrorKind::Auth);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retry_after_is_honored_over_computed_backoff() {
        let calls = AtomicU32::new(0);
        let start = std::time::Instant::now();
        let _: Result<&str, BackendError> = retry_with_backoff(|| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    let mut err = BackendError::rate_limited(429, Some(Duration::from_millis(5)));
                    err.retryable = true;
                    Err(err)
                } else {
                    Ok("ok")
                }
            }
        })
        .await;
        assert!(start.elapsed() >= Duration::from_millis(5));
    }
}
