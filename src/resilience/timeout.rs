//! # Timeout Guard
//!
//! Races an operation against a deadline. If the deadline elapses first the
//! call rejects with [`GovernorError::QueryTimeout`]; the underlying future is
//! dropped on our side but never force-cancelled server-side, so a timed-out
//! query may still complete in the datastore with its result discarded.

use crate::error::GovernorError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Execute `operation` with a deadline of `duration`.
///
/// The operation's value or error propagates unchanged when it finishes
/// first; only a fired timer is rewritten into a timeout error carrying the
/// operation label.
pub async fn with_timeout<T, E, Fut>(
    label: &str,
    duration: Duration,
    operation: Fut,
) -> Result<Result<T, E>, GovernorError>
where
    Fut: Future<Output = Result<T, E>>,
{
    match tokio::time::timeout(duration, operation).await {
        Ok(result) => Ok(result),
        Err(_) => {
            warn!(
                operation = %label,
                timeout_ms = duration.as_millis() as u64,
                "⏱️ Operation timed out (underlying call abandoned)"
            );
            Err(GovernorError::QueryTimeout {
                operation: label.to_string(),
                timeout_ms: duration.as_millis() as u64,
            })
        }
    }
}
