//! # Resilience Module
//!
//! Fault tolerance primitives for guarded datastore and AI service calls.
//!
//! ## Architecture
//!
//! - **Timeout Guard**: bounds every guarded call with a deadline
//! - **Retry Executor**: policy-driven re-invocation with injected backoff
//! - **Circuit Breakers**: prevent cascade failures by isolating failing
//!   operations behind a closed/open/half-open state machine
//! - **Manager**: explicit breaker-by-name registry, one instance per
//!   logical operation
//!
//! ## Usage
//!
//! ```rust,no_run
//! use guardian_core::config::ComponentBreakerConfig;
//! use guardian_core::resilience::CircuitBreaker;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let breaker = CircuitBreaker::new("generate".to_string(), ComponentBreakerConfig::default());
//!
//! let result = breaker
//!     .call(|| async {
//!         // datastore or AI call here
//!         Ok::<&str, std::io::Error>("success")
//!     })
//!     .await;
//! # Ok(())
//! # }
//! ```

pub mod circuit_breaker;
pub mod manager;
pub mod retry;
pub mod timeout;

pub use circuit_breaker::{BreakerError, BreakerMetrics, CircuitBreaker, CircuitState};
pub use manager::CircuitBreakerManager;
pub use retry::{default_backoff, execute_with_retry, BackoffFn, RetryFailure, RetryPolicy};
pub use timeout::with_timeout;
