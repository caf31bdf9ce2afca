//! Retry engine with permanent-error short-circuit and deadline sub-budgets.
//!
//! [`run`] retries an operation with exponential back-off until it succeeds,
//! fails with an error marked [`permanent`], or the timeout elapses. The
//! maximum interval is a third of the timeout.
//!
//! [`run_with_deadline`] additionally honours a [`Scope`]: the effective
//! timeout is capped by the scope's deadline, each attempt runs in its own
//! child scope bounded to `timeout / min_attempts`, and cancelling the scope
//! aborts the in-flight attempt and stops retrying.

mod backoff;
mod scope;

pub use backoff::{
    ExponentialBackoff, DEFAULT_INITIAL_INTERVAL, DEFAULT_MULTIPLIER,
    DEFAULT_RANDOMIZATION_FACTOR,
};
pub use scope::Scope;

use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, trace};

/// Minimum number of attempts [`run_with_deadline`] fits into its budget.
pub const DEFAULT_MIN_ATTEMPTS: u32 = 2;

/// Mark an error so the retry engine returns it without retrying.
pub fn permanent(err: Error) -> Error {
    err.permanent()
}

/// Retry `op` until it succeeds, fails permanently, or `timeout` elapses.
///
/// On timeout the last error returned by `op` is returned. A permanent error
/// is unwrapped and its cause returned immediately.
pub async fn run<T, F, Fut>(op: F, timeout: Duration) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    retry_loop(None, timeout, op).await
}

/// [`run_with_deadline_attempts`] with [`DEFAULT_MIN_ATTEMPTS`].
pub async fn run_with_deadline<T, F, Fut>(scope: &Scope, op: F, timeout: Duration) -> Result<T>
where
    F: FnMut(Scope) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    run_with_deadline_attempts(scope, op, timeout, DEFAULT_MIN_ATTEMPTS).await
}

/// Retry `op` inside `scope`, giving each attempt its own sub-deadline.
///
/// Each attempt receives a child scope bounded to `timeout / min_attempts`
/// so that one stalled attempt cannot consume the whole budget. The child
/// scope is cancelled once the attempt finishes.
pub async fn run_with_deadline_attempts<T, F, Fut>(
    scope: &Scope,
    mut op: F,
    timeout: Duration,
    min_attempts: u32,
) -> Result<T>
where
    F: FnMut(Scope) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let effective = match scope.remaining() {
        Some(remaining) => timeout.min(remaining),
        None => timeout,
    };
    let per_attempt = effective / min_attempts.max(1);
    let outer = scope.child_with_timeout(effective);

    retry_loop(Some(&outer), effective, || {
        let sub = outer.child_with_timeout(per_attempt);
        let fut = op(sub.clone());
        async move {
            let res = sub.run(fut).await.and_then(|r| r);
            sub.cancel();
            res
        }
    })
    .await
}

async fn retry_loop<T, F, Fut>(scope: Option<&Scope>, timeout: Duration, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut backoff = ExponentialBackoff::for_timeout(timeout);
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if err.is_permanent() {
            debug!(attempt, error = %err, "permanent failure, not retrying");
            return Err(match err.into_permanent() {
                Ok(cause) | Err(cause) => cause,
            });
        }

        if scope.map_or(false, Scope::is_cancelled) {
            debug!(attempt, "scope cancelled, not retrying");
            return Err(Error::Cancelled);
        }

        let wait = match backoff.next_backoff() {
            Some(wait) => wait,
            None => {
                debug!(
                    attempt,
                    elapsed_ms = backoff.elapsed().as_millis() as u64,
                    error = %err,
                    "retry budget exhausted"
                );
                return Err(err);
            }
        };

        trace!(
            attempt,
            wait_ms = wait.as_millis() as u64,
            error = %err,
            "attempt failed, backing off"
        );

        match scope {
            Some(scope) => {
                tokio::select! {
                    biased;
                    _ = scope.cancelled() => return Err(Error::Cancelled),
                    _ = tokio::time::sleep(wait) => {}
                }
            }
            None => tokio::time::sleep(wait).await,
        }

        if scope.map_or(false, Scope::is_expired) {
            debug!(attempt, error = %err, "scope deadline passed");
            return Err(err);
        }
    }
}
