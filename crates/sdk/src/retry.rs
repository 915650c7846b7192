//! Retry logic with exponential backoff.
//!
//! Provides retry wrappers using the `backon` crate with
//! configurable backoff policies.

use std::{
    future::Future,
    sync::atomic::{AtomicU32, Ordering},
    time::Duration,
};

use backon::{ExponentialBuilder, Retryable};
use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::{
    config::RetryPolicy,
    error::{Result, SdkError},
};

/// Execute an async operation with retry using exponential backoff.
///
/// The operation will be retried according to the provided [`RetryPolicy`] if
/// it fails with a retryable error (as determined by [`SdkError::is_retryable`]).
///
/// # Retry Strategy
///
/// - **Exponential backoff**: `initial_backoff * multiplier^(attempt-1)`
/// - **Jitter**: randomness added when `jitter` is non-zero
/// - **Cap**: Backoff capped at `max_backoff`
/// - **Termination**: After `max_attempts` failed attempts
///
/// A `Retry-After` delay sent with a 429 replaces the computed backoff when
/// it is longer.
///
/// If the final failure is still retryable it is reported as
/// [`SdkError::RetryExhausted`]. Non-retryable errors are returned unchanged
/// after the first attempt.
///
/// # Example
///
/// ```ignore
/// use text2everything_sdk::{with_retry, RetryPolicy, SdkError};
///
/// let policy = RetryPolicy::default();
/// let result = with_retry(&policy, || async {
///     Ok::<_, SdkError>("success")
/// }).await;
/// ```
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    // backon's max_times counts retries, not attempts.
    let max_retries = policy.max_attempts.saturating_sub(1) as usize;

    let mut backoff = ExponentialBuilder::new()
        .with_min_delay(policy.initial_backoff)
        .with_max_delay(policy.max_backoff)
        .with_factor(policy.multiplier as f32)
        .with_max_times(max_retries);
    if policy.jitter > 0.0 {
        backoff = backoff.with_jitter();
    }

    let attempt_count = AtomicU32::new(0);

    operation
        .retry(backoff)
        .sleep(tokio::time::sleep)
        .when(|e: &SdkError| e.is_retryable())
        .adjust(|err: &SdkError, dur: Option<Duration>| {
            dur.map(|d| err.retry_after().map_or(d, |requested| requested.max(d)))
        })
        .notify(|err: &SdkError, dur: Duration| {
            let attempt = attempt_count.fetch_add(1, Ordering::SeqCst) + 1;
            tracing::debug!(
                attempt = attempt,
                backoff_ms = dur.as_millis() as u64,
                error_type = err.error_type(),
                error = %err,
                "retrying after backoff"
            );
        })
        .await
        .map_err(|e| {
            if e.is_retryable() {
                SdkError::RetryExhausted {
                    attempts: attempt_count.load(Ordering::SeqCst) + 1,
                    last_error: e.to_string(),
                }
            } else {
                e
            }
        })
}

/// Execute an async operation with retry and cancellation support.
///
/// Behaves like [`with_retry`], but races each attempt against the provided
/// `CancellationToken` and honors a server-supplied `Retry-After` delay.
///
/// # Cancellation Semantics
///
/// - If the token is already cancelled at call time, returns `Cancelled` immediately.
/// - If the token is cancelled during an attempt, the in-flight attempt is dropped and `Cancelled`
///   is returned.
/// - If the token is cancelled during a backoff sleep, the sleep is interrupted and `Cancelled` is
///   returned.
pub async fn with_retry_cancellable<F, Fut, T>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if token.is_cancelled() {
        return Err(SdkError::Cancelled);
    }

    let mut attempt: u32 = 0;
    let mut backoff_duration = policy.initial_backoff;

    loop {
        attempt += 1;

        let result = tokio::select! {
            biased;
            () = token.cancelled() => {
                return Err(SdkError::Cancelled);
            }
            result = operation() => result,
        };

        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_retryable() {
            return Err(err);
        }
        if attempt >= policy.max_attempts {
            return Err(SdkError::RetryExhausted { attempts: attempt, last_error: err.to_string() });
        }

        let wait = err.retry_after().unwrap_or_else(|| apply_jitter(backoff_duration, policy.jitter));

        tracing::debug!(
            operation = operation_name,
            attempt = attempt,
            backoff_ms = wait.as_millis() as u64,
            error_type = err.error_type(),
            error = %err,
            "retrying after backoff (cancellable)"
        );

        tokio::select! {
            biased;
            () = token.cancelled() => {
                return Err(SdkError::Cancelled);
            }
            () = tokio::time::sleep(wait) => {}
        }

        backoff_duration = std::cmp::min(
            Duration::from_nanos((backoff_duration.as_nanos() as f64 * policy.multiplier) as u64),
            policy.max_backoff,
        );
    }
}

/// Apply jitter to a duration.
///
/// Jitter adds randomness in the range `[dur * (1 - factor), dur * (1 + factor)]`
/// so that many items retrying at once do not hit the server in lockstep.
fn apply_jitter(dur: Duration, factor: f64) -> Duration {
    if factor <= 0.0 {
        return dur;
    }

    let factor = factor.clamp(0.0, 1.0);
    let mut rng = rand::rng();

    let base_nanos = dur.as_nanos() as f64;
    let min_nanos = base_nanos * (1.0 - factor);
    let max_nanos = base_nanos * (1.0 + factor);

    let jittered_nanos = rng.random_range(min_nanos..=max_nanos);
    Duration::from_nanos(jittered_nanos as u64)
}
