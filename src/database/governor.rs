//! # Query Governor
//!
//! Composes circuit breaker → retry executor → timeout guard around every
//! datastore call. The composition order matters: the breaker's
//! open/half-open check happens before any retry budget is spent, and a
//! fully exhausted retry sequence counts as exactly *one* breaker failure —
//! not one per attempt — so transient blips do not trip the circuit
//! prematurely.

use crate::config::{CircuitBreakerSettings, GovernorSettings, GuardianConfig};
use crate::error::{BoxError, GovernorError};
use crate::logging::log_query_operation;
use crate::resilience::{
    execute_with_retry, with_timeout, BreakerError, CircuitBreakerManager, RetryPolicy,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Per-call overrides for governed execution. Unset fields fall back to the
/// governor's settings.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub timeout: Option<Duration>,
    pub retries: Option<u32>,
}

impl QueryOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }
}

/// Attempt-level failure inside the retry loop: either the timeout guard
/// fired or the wrapped operation itself failed.
enum AttemptError<E> {
    Timeout(GovernorError),
    Operation(E),
}

/// Guarded execution wrapper for every datastore access.
///
/// Owns the process-wide circuit breaker registry; construct one at process
/// start and share it.
#[derive(Debug)]
pub struct QueryGovernor {
    settings: GovernorSettings,
    breakers: Arc<CircuitBreakerManager>,
}

impl QueryGovernor {
    /// Governor with default execution settings and the given breaker settings
    pub fn new(breaker_settings: CircuitBreakerSettings) -> Self {
        Self::with_settings(GovernorSettings::default(), breaker_settings)
    }

    pub fn with_settings(
        settings: GovernorSettings,
        breaker_settings: CircuitBreakerSettings,
    ) -> Self {
        Self {
            settings,
            breakers: Arc::new(CircuitBreakerManager::from_config(breaker_settings)),
        }
    }

    pub fn from_config(config: &GuardianConfig) -> Self {
        Self::with_settings(config.governor.clone(), config.circuit_breakers.clone())
    }

    /// The breaker registry, for health endpoints and metrics export
    pub fn breaker_manager(&self) -> &Arc<CircuitBreakerManager> {
        &self.breakers
    }

    /// Execute a datastore operation under timeout, retry, and circuit
    /// breaker protection. All errors are treated as retryable; use
    /// [`Self::with_db_query_classified`] when some failures (e.g.
    /// validation) must short-circuit the retry budget.
    pub async fn with_db_query<T, E, F, Fut>(
        &self,
        operation_name: &str,
        options: QueryOptions,
        make_query: F,
    ) -> Result<T, GovernorError>
    where
        E: Into<BoxError>,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.with_db_query_classified(operation_name, options, |_| true, make_query)
            .await
    }

    /// Governed execution with a caller-supplied retryability classifier.
    ///
    /// The classifier sees the raw operation error; returning `false`
    /// short-circuits the retry loop immediately. Timeouts are always
    /// retryable within the budget.
    pub async fn with_db_query_classified<T, E, F, Fut>(
        &self,
        operation_name: &str,
        options: QueryOptions,
        is_retryable: impl Fn(&E) -> bool,
        make_query: F,
    ) -> Result<T, GovernorError>
    where
        E: Into<BoxError>,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let timeout = options.timeout.unwrap_or_else(|| self.settings.timeout());
        let policy = RetryPolicy::new(options.retries.unwrap_or(self.settings.retries));

        let run_attempts = || {
            execute_with_retry(
                operation_name,
                &policy,
                |error: &AttemptError<E>| match error {
                    AttemptError::Timeout(_) => true,
                    AttemptError::Operation(e) => is_retryable(e),
                },
                || async {
                    match with_timeout(operation_name, timeout, make_query()).await {
                        Ok(Ok(value)) => Ok(value),
                        Ok(Err(e)) => Err(AttemptError::Operation(e)),
                        Err(timeout_err) => Err(AttemptError::Timeout(timeout_err)),
                    }
                },
            )
        };

        let result = if self.breakers.enabled() {
            let breaker = self.breakers.breaker_for(operation_name);
            match breaker.call(run_attempts).await {
                Ok(value) => Ok(value),
                Err(BreakerError::CircuitOpen {
                    operation,
                    retry_after,
                }) => Err(GovernorError::CircuitOpen {
                    operation,
                    retry_after,
                }),
                Err(BreakerError::OperationFailed(failure)) => {
                    Err(Self::map_exhausted(operation_name, failure))
                }
            }
        } else {
            run_attempts()
                .await
                .map_err(|failure| Self::map_exhausted(operation_name, failure))
        };

        match &result {
            Ok(_) => log_query_operation(operation_name, "success", None, None, None),
            Err(e) => log_query_operation(operation_name, "failed", None, None, Some(&e.to_string())),
        }

        result
    }

    fn map_exhausted<E>(
        operation_name: &str,
        failure: crate::resilience::RetryFailure<AttemptError<E>>,
    ) -> GovernorError
    where
        E: Into<BoxError>,
    {
        match failure.last_error {
            AttemptError::Timeout(timeout_err) => timeout_err,
            AttemptError::Operation(e) => GovernorError::Database {
                operation: operation_name.to_string(),
                attempts: failure.attempts,
                source: e.into(),
            },
        }
    }
}
