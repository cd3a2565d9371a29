//! # Database Module
//!
//! Guarded datastore execution. Every datastore access goes through
//! [`QueryGovernor::with_db_query`], which composes the circuit breaker,
//! retry executor, and timeout guard into a single protected call. The
//! [`paginated_query`] and [`batch_query`] helpers build on top for list
//! endpoints and burst-shaped bulk work.

pub mod batch;
pub mod connection;
pub mod governor;
pub mod pagination;

pub use batch::{batch_query, BatchOptions};
pub use connection::DatabaseConnection;
pub use governor::{QueryGovernor, QueryOptions};
pub use pagination::{paginated_query, Page};
