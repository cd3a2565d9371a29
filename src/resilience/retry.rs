//! # Retry Executor
//!
//! Policy-driven re-invocation of failed operations. The backoff schedule is
//! an injected `attempt -> delay` function, so the policy is a first-class,
//! testable value instead of inline sleep calls.
//!
//! # Backoff Schedule (defaults)
//!
//! | Attempt | Delay  |
//! |---------|--------|
//! | 0       | 100ms  |
//! | 1       | 200ms  |
//! | 2       | 400ms  |
//! | 3       | 800ms  |
//! | 4       | 1600ms |
//! | 5+      | 2000ms (cap) |

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Backoff function: maps a zero-based failed-attempt index to a delay.
pub type BackoffFn = Arc<dyn Fn(u32) -> Duration + Send + Sync>;

/// Retry policy for a guarded operation.
///
/// `retries` is the number of *additional* attempts after the first failure,
/// so total attempts = `retries + 1`.
#[derive(Clone)]
pub struct RetryPolicy {
    pub retries: u32,
    pub backoff: BackoffFn,
}

impl RetryPolicy {
    /// Policy with the given retry count and the default exponential backoff.
    pub fn new(retries: u32) -> Self {
        Self {
            retries,
            backoff: default_backoff(),
        }
    }

    /// Policy with a custom backoff function.
    pub fn with_backoff(retries: u32, backoff: BackoffFn) -> Self {
        Self { retries, backoff }
    }

    /// Policy that never retries.
    pub fn none() -> Self {
        Self::new(0)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2)
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("retries", &self.retries)
            .finish_non_exhaustive()
    }
}

/// Default exponential backoff: 100ms doubling per attempt, capped at 2s.
pub fn default_backoff() -> BackoffFn {
    Arc::new(|attempt| {
        let ms = 100u64.saturating_mul(1 << attempt.min(10));
        Duration::from_millis(ms.min(2000))
    })
}

/// Terminal failure of a retry sequence: the last error plus how many
/// attempts were consumed before giving up.
#[derive(Debug)]
pub struct RetryFailure<E> {
    pub last_error: E,
    pub attempts: u32,
}

/// Invoke `make_attempt` until it succeeds, retries are exhausted, or the
/// error is classified non-retryable.
///
/// The executor does not classify errors itself; `is_retryable` comes from
/// the caller. A non-retryable error short-circuits without consuming any
/// remaining retry budget.
pub async fn execute_with_retry<T, E, F, Fut>(
    operation: &str,
    policy: &RetryPolicy,
    is_retryable: impl Fn(&E) -> bool,
    mut make_attempt: F,
) -> Result<T, RetryFailure<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let total_attempts = policy.retries + 1;
    let mut attempts = 0u32;

    loop {
        match make_attempt().await {
            Ok(value) => {
                if attempts > 0 {
                    debug!(
                        operation = %operation,
                        attempts = attempts + 1,
                        "🔁 Operation recovered after retry"
                    );
                }
                return Ok(value);
            }
            Err(error) => {
                attempts += 1;

                if !is_retryable(&error) {
                    debug!(
                        operation = %operation,
                        attempts = attempts,
                        "Non-retryable error, short-circuiting retry budget"
                    );
                    return Err(RetryFailure {
                        last_error: error,
                        attempts,
                    });
                }

                if attempts >= total_attempts {
                    warn!(
                        operation = %operation,
                        attempts = attempts,
                        "🔁 Retry budget exhausted"
                    );
                    return Err(RetryFailure {
                        last_error: error,
                        attempts,
                    });
                }

                let delay = (policy.backoff)(attempts - 1);
                debug!(
                    operation = %operation,
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    "🔁 Attempt failed, backing off before retry"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
