//! Retry with pure exponential backoff, and per-attempt timeouts.

use std::future::Future;
use std::time::Duration;

use crate::error::SearchError;
use crate::types::RetryConfig;

/// Run `operation` until it succeeds or `retry.max_retries + 1` attempts
/// have failed.
///
/// After failed attempt `n` (0-based) the task sleeps
/// `backoff_ms * backoff_multiplier^n` before trying again. No jitter is
/// applied.
///
/// # Errors
///
/// Returns the error of the final attempt.
pub async fn execute_with_retry<T, F, Fut>(
    mut operation: F,
    retry: &RetryConfig,
) -> Result<T, SearchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SearchError>>,
{
    let mut attempt: u32 = 0;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= retry.max_retries => return Err(err),
            Err(err) => {
                let delay = retry.delay_for_attempt(attempt);
                tracing::debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "attempt failed, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Bound `fut` by `timeout`, mapping expiry to [`SearchError::Timeout`].
pub(crate) async fn with_timeout<T, Fut>(
    fut: Fut,
    timeout: Option<Duration>,
    source_id: &str,
) -> Result<T, SearchError>
where
    Fut: Future<Output = Result<T, SearchError>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| {
            SearchError::Timeout(format!("{source_id} exceeded {}ms", limit.as_millis()))
        })?,
        None => fut.await,
    }
}
