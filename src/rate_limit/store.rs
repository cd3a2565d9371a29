//! # Rate Limit Counter Stores
//!
//! The store owns the only piece of the limiter that must be atomic:
//! increment-if-below. [`PostgresRateLimitStore`] rides on a conditional
//! upsert (`ON CONFLICT ... DO UPDATE ... WHERE requests_count < limit`) so
//! a rejected request never bumps the counter, even under concurrent
//! writers across instances. [`InMemoryRateLimitStore`] gives tests and
//! embedded deployments the same semantics behind a sharded map.

use crate::error::RateLimitError;
use crate::rate_limit::WindowKey;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sqlx::{PgPool, Row};
use tracing::debug;

/// Result of an atomic increment-if-below.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncrementOutcome {
    /// Counter was incremented; `count` is the post-increment value
    Admitted { count: u32 },
    /// Counter is already at the limit; nothing was written
    Rejected,
}

/// Durable counter store for fixed-window rate limiting.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Atomically increment the counter for `key` iff it is below `limit`.
    ///
    /// Implementations must use the backing store's native conditional
    /// update; read-then-write would over-admit under concurrent requests.
    async fn increment_if_below(
        &self,
        key: &WindowKey,
        limit: u32,
    ) -> Result<IncrementOutcome, RateLimitError>;

    /// Opportunistically delete counters for windows that started before
    /// `cutoff`. Returns the number of rows removed.
    async fn prune_windows_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RateLimitError>;
}

/// Postgres-backed counter store: one row per `(identifier, action,
/// window_start)`, superseded naturally as windows roll over.
pub struct PostgresRateLimitStore {
    pool: PgPool,
}

impl PostgresRateLimitStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and make sure the counter table exists.
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        let connection = crate::database::DatabaseConnection::from_url(database_url).await?;
        let store = Self::new(connection.pool().clone());
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Idempotent DDL for the counter table.
    pub async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS rate_limit_counters (
                identifier     TEXT        NOT NULL,
                action         TEXT        NOT NULL,
                window_start   TIMESTAMPTZ NOT NULL,
                requests_count INTEGER     NOT NULL DEFAULT 0,
                updated_at     TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (identifier, action, window_start)
            )
            ",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl RateLimitStore for PostgresRateLimitStore {
    async fn increment_if_below(
        &self,
        key: &WindowKey,
        limit: u32,
    ) -> Result<IncrementOutcome, RateLimitError> {
        // The WHERE clause on the DO UPDATE arm makes the upsert a no-op
        // once the counter reaches the limit; RETURNING then yields no row.
        let row = sqlx::query(
            r"
            INSERT INTO rate_limit_counters (identifier, action, window_start, requests_count, updated_at)
            VALUES ($1, $2, $3, 1, NOW())
            ON CONFLICT (identifier, action, window_start)
            DO UPDATE SET
                requests_count = rate_limit_counters.requests_count + 1,
                updated_at = NOW()
            WHERE rate_limit_counters.requests_count < $4
            RETURNING requests_count
            ",
        )
        .bind(&key.identifier)
        .bind(&key.action)
        .bind(key.window_start)
        .bind(limit as i32)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RateLimitError::Store(Box::new(e)))?;

        match row {
            Some(row) => {
                let count: i32 = row.get("requests_count");
                Ok(IncrementOutcome::Admitted {
                    count: count.max(0) as u32,
                })
            }
            None => Ok(IncrementOutcome::Rejected),
        }
    }

    async fn prune_windows_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RateLimitError> {
        let result = sqlx::query("DELETE FROM rate_limit_counters WHERE window_start < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(|e| RateLimitError::Store(Box::new(e)))?;

        debug!(rows = result.rows_affected(), "Pruned expired rate limit windows");
        Ok(result.rows_affected())
    }
}

/// In-memory counter store with the same conditional-increment contract,
/// for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryRateLimitStore {
    counters: DashMap<(String, String, DateTime<Utc>), u32>,
}

impl InMemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live window counters (test visibility)
    pub fn window_count(&self) -> usize {
        self.counters.len()
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimitStore {
    async fn increment_if_below(
        &self,
        key: &WindowKey,
        limit: u32,
    ) -> Result<IncrementOutcome, RateLimitError> {
        let map_key = (
            key.identifier.clone(),
            key.action.clone(),
            key.window_start,
        );

        // The entry guard holds the shard lock, making check-and-increment
        // atomic with respect to concurrent callers.
        let mut entry = self.counters.entry(map_key).or_insert(0);
        if *entry < limit {
            *entry += 1;
            Ok(IncrementOutcome::Admitted { count: *entry })
        } else {
            Ok(IncrementOutcome::Rejected)
        }
    }

    async fn prune_windows_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RateLimitError> {
        let before = self.counters.len();
        self.counters.retain(|(_, _, window_start), _| *window_start >= cutoff);
        Ok((before - self.counters.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn key_at(identifier: &str, ts: i64) -> WindowKey {
        WindowKey {
            identifier: identifier.to_string(),
            action: "generate".to_string(),
            window_start: Utc.timestamp_opt(ts, 0).single().unwrap(),
        }
    }

    #[tokio::test]
    async fn increments_until_limit_then_rejects_without_writing() {
        let store = InMemoryRateLimitStore::new();
        let key = key_at("user:1", 1_000_000);

        for expected in 1..=3u32 {
            let outcome = store.increment_if_below(&key, 3).await.unwrap();
            assert_eq!(outcome, IncrementOutcome::Admitted { count: expected });
        }

        let rejected = store.increment_if_below(&key, 3).await.unwrap();
        assert_eq!(rejected, IncrementOutcome::Rejected);

        // Counter did not move past the limit.
        let after = store.increment_if_below(&key, 4).await.unwrap();
        assert_eq!(after, IncrementOutcome::Admitted { count: 4 });
    }

    #[tokio::test]
    async fn prune_drops_only_old_windows() {
        let store = InMemoryRateLimitStore::new();
        let old = key_at("user:1", 1_000_000);
        let fresh = key_at("user:1", 2_000_000);

        store.increment_if_below(&old, 10).await.unwrap();
        store.increment_if_below(&fresh, 10).await.unwrap();
        assert_eq!(store.window_count(), 2);

        let cutoff = Utc.timestamp_opt(1_500_000, 0).single().unwrap();
        let removed = store.prune_windows_before(cutoff).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.window_count(), 1);
    }
}
