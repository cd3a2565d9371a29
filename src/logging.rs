//! # Structured Logging Module
//!
//! Environment-aware structured logging for debugging governed queries,
//! rate-limit decisions, and cache behavior across stateless instances.

use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Env vars are process-global; tests that mutate them must not overlap.
#[cfg(test)]
pub(crate) static ENV_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

/// Initialize structured logging with environment-specific configuration.
///
/// Safe to call more than once; only the first call installs a subscriber,
/// and an already-installed global subscriber (e.g. from the host
/// application) is left in place.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);

        let subscriber = tracing_subscriber::registry().with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_filter(EnvFilter::new(log_level)),
        );

        if subscriber.try_init().is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        }

        tracing::info!(
            environment = %environment,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("GUARDIAN_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .or_else(|_| std::env::var("RUST_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for governed query operations
pub fn log_query_operation(
    operation: &str,
    status: &str,
    attempts: Option<u32>,
    duration_ms: Option<u64>,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        status = %status,
        attempts = attempts,
        duration_ms = duration_ms,
        details = details,
        "💾 QUERY_OPERATION"
    );
}

/// Log structured data for rate limit decisions
pub fn log_rate_limit_decision(
    identifier: &str,
    action: &str,
    allowed: bool,
    count: Option<u32>,
    retry_after_secs: Option<u64>,
) {
    tracing::info!(
        identifier = %identifier,
        action = %action,
        allowed = allowed,
        count = count,
        retry_after_secs = retry_after_secs,
        "🚦 RATE_LIMIT_DECISION"
    );
}

/// Log structured data for cache operations
pub fn log_cache_operation(operation: &str, key: &str, status: &str, details: Option<&str>) {
    tracing::debug!(
        operation = %operation,
        key = %key,
        status = %status,
        details = details,
        "📦 CACHE_OPERATION"
    );
}
