//! # Structured Error Handling
//!
//! Error taxonomy for the resilience and caching core. Governed query errors
//! cross the library boundary as typed failures that callers inspect to pick
//! an HTTP status or user message: timeouts and open circuits map to "service
//! temporarily unavailable, retry shortly", rate-limit denials surface their
//! numeric retry-after. Cache store errors never cross the boundary at all —
//! the cache absorbs them and degrades to a miss.

use std::time::Duration;

/// Boxed source error for wrapped datastore failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by governed query execution.
///
/// Every variant carries the logical operation name so callers and logs can
/// attribute the failure without string parsing.
#[derive(Debug, thiserror::Error)]
pub enum GovernorError {
    /// The operation exceeded its deadline. Retryable by the caller; the
    /// underlying call is abandoned, not cancelled.
    #[error("operation '{operation}' timed out after {timeout_ms}ms")]
    QueryTimeout { operation: String, timeout_ms: u64 },

    /// The operation failed after exhausting its retry budget, wrapping the
    /// final failure.
    #[error("operation '{operation}' failed after {attempts} attempt(s): {source}")]
    Database {
        operation: String,
        attempts: u32,
        #[source]
        source: BoxError,
    },

    /// The circuit for this operation is open; the call was rejected without
    /// executing. Callers should back off at least `retry_after`.
    #[error("circuit breaker open for '{operation}', retry after {}s", retry_after.as_secs())]
    CircuitOpen {
        operation: String,
        retry_after: Duration,
    },
}

impl GovernorError {
    /// Operation name the failure is attributed to.
    pub fn operation(&self) -> &str {
        match self {
            Self::QueryTimeout { operation, .. }
            | Self::Database { operation, .. }
            | Self::CircuitOpen { operation, .. } => operation,
        }
    }

    /// Whether a later retry by the caller could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::CircuitOpen { .. })
    }
}

/// Errors from the rate limiter's backing store.
///
/// A quota denial is *not* an error — it is a [`crate::rate_limit::RateLimitDecision`]
/// with `allowed: false`. This type only covers the store itself failing.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    #[error("rate limit store error: {0}")]
    Store(#[source] BoxError),
}

/// Errors at the key-value store seam backing the cache.
///
/// These stop at [`crate::cache::TagIndexedCache`]: every cache operation
/// swallows them and behaves as a miss or no-op.
#[derive(Debug, thiserror::Error)]
pub enum CacheStoreError {
    #[error("key-value store error: {0}")]
    Backend(#[source] BoxError),

    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GovernorError>;
