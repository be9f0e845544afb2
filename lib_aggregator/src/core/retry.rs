//! # Retry Executor
//!
//! Runs a fallible async operation up to a fixed number of attempts with a
//! fixed pause between them. This is deliberately simpler than the
//! exponential backoff applied at the transport layer (`retrieve::ky_http`):
//! it wraps whole units of work such as "fetch contributor stats for one
//! repository", where the remote side is known to answer "not ready yet" for
//! a while before producing data.
//!
//! A [`CancellationToken`] takes priority over any remaining attempts, so a
//! shutting-down scheduler never waits out a retry delay.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Attempt count plus fixed inter-attempt delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of invocations. `0` is treated as `1`.
    pub attempts: u32,
    /// Pause between two consecutive attempts.
    pub delay: Duration,
}

impl RetryPolicy {
    /// Creates a policy of `attempts` tries spaced by `delay`.
    pub const fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }
}

impl Default for RetryPolicy {
    /// 5 attempts, 10 seconds apart.
    fn default() -> Self {
        Self::new(5, Duration::from_secs(10))
    }
}

/// Why [`retry`] gave up.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// The cancellation token fired before the operation succeeded.
    #[error("cancelled before the operation succeeded")]
    Cancelled,
    /// Every attempt failed; `last` is the error of the final attempt.
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted {
        /// Number of invocations made.
        attempts: u32,
        /// The last observed failure.
        last: E,
    },
}

impl<E> RetryError<E> {
    /// The last failure, if the attempts were exhausted rather than cancelled.
    pub fn into_last(self) -> Option<E> {
        match self {
            RetryError::Cancelled => None,
            RetryError::Exhausted { last, .. } => Some(last),
        }
    }
}

/// # Retry
///
/// Invokes `operation` until it succeeds or `policy.attempts` invocations
/// have failed.
///
/// `label` only feeds the log lines, so operators can tell which resource a
/// warning belongs to.
///
/// ## Cancellation
/// The token is checked before every attempt and raced against both the
/// in-flight attempt and the delay sleep.
pub async fn retry<T, E, F, Fut>(
    label: &str,
    policy: RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = policy.attempts.max(1);
    let mut attempt = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }
        attempt += 1;

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
            outcome = operation() => outcome,
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= max_attempts => {
                log::warn!("[{}] attempt {}/{} failed: {}. Giving up.", label, attempt, max_attempts, e);
                return Err(RetryError::Exhausted { attempts: attempt, last: e });
            }
            Err(e) => {
                log::warn!(
                    "[{}] attempt {}/{} failed: {}. Retrying in {:?}.",
                    label,
                    attempt,
                    max_attempts,
                    e,
                    policy.delay
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                    _ = tokio::time::sleep(policy.delay) => {}
                }
            }
        }
    }
}
