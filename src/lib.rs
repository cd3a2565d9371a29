#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Guardian Core
//!
//! Request-resilience and caching core that shields a backing datastore and an
//! external AI service from overload, transient failure, and repeated redundant
//! work.
//!
//! ## Overview
//!
//! Three cooperating mechanisms make up the core:
//!
//! - **Guarded execution** ([`database::QueryGovernor`]): every datastore call
//!   is bounded by a timeout, a retry policy, and a per-operation circuit
//!   breaker, composed in that order so an open breaker rejects before any
//!   retry budget is spent.
//! - **Rate limiting** ([`rate_limit`]): identifier- and action-scoped fixed
//!   window quotas backed by a durable counter store with atomic
//!   increment-and-check semantics.
//! - **Tag-indexed caching** ([`cache::TagIndexedCache`]): TTL-based key/value
//!   caching over an external store with a secondary tag index for bulk
//!   invalidation by semantic tag.
//!
//! The core is a library layer consumed by route handlers; it defines no wire
//! protocol of its own. Rate-limit and cache state live in externally shared
//! stores so they stay consistent across stateless instances; circuit breaker
//! state is deliberately process-local (see
//! [`resilience::CircuitBreakerManager`]).
//!
//! ## Module Organization
//!
//! - [`resilience`] - Timeout guard, retry executor, circuit breakers
//! - [`database`] - Guarded query execution, pagination, batching
//! - [`rate_limit`] - Per-window request quotas over a durable counter store
//! - [`cache`] - Tag-indexed TTL cache over a key-value store
//! - [`config`] - Configuration management
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use guardian_core::config::GuardianConfig;
//! use guardian_core::database::{QueryGovernor, QueryOptions};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GuardianConfig::from_environment();
//! let governor = QueryGovernor::new(config.circuit_breakers.clone());
//!
//! let count: i64 = governor
//!     .with_db_query("favorites", QueryOptions::default(), || async {
//!         // datastore call here
//!         Ok::<_, sqlx::Error>(42)
//!     })
//!     .await?;
//!
//! assert_eq!(count, 42);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod logging;
pub mod rate_limit;
pub mod resilience;

pub use config::{
    CacheSettings, CircuitBreakerSettings, ComponentBreakerConfig, GovernorSettings,
    GuardianConfig, RateLimitSettings,
};
pub use database::{batch_query, paginated_query, BatchOptions, Page, QueryGovernor, QueryOptions};
pub use error::{GovernorError, RateLimitError, Result};
pub use rate_limit::{check_rate_limit, Action, Identifier, RateLimitDecision, Tier};
pub use resilience::{CircuitBreaker, CircuitBreakerManager, CircuitState, RetryPolicy};
