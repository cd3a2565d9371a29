//! # Key-Value Store Backends
//!
//! The cache rides on an external store with `get`/`put`/`delete`/`list`
//! semantics. [`RedisKvStore`] is the shared production backend;
//! [`InMemoryKvStore`] serves tests and single-process deployments with the
//! same contract, including native TTL expiry.

use crate::error::CacheStoreError;
use async_trait::async_trait;
use dashmap::DashMap;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// External key-value store seam backing the cache.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheStoreError>;

    /// Store `value` under `key`, with the store's native expiry when
    /// `expiration_ttl` is given.
    async fn put(
        &self,
        key: &str,
        value: String,
        expiration_ttl: Option<Duration>,
    ) -> Result<(), CacheStoreError>;

    async fn delete(&self, key: &str) -> Result<(), CacheStoreError>;

    /// List keys beginning with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, CacheStoreError>;
}

/// Redis-backed store using a multiplexed async connection per call.
pub struct RedisKvStore {
    client: Arc<redis::Client>,
}

impl RedisKvStore {
    pub fn new(client: Arc<redis::Client>) -> Self {
        Self { client }
    }

    pub fn from_url(url: &str) -> Result<Self, CacheStoreError> {
        let client = redis::Client::open(url).map_err(|e| CacheStoreError::Backend(Box::new(e)))?;
        Ok(Self::new(Arc::new(client)))
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, CacheStoreError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CacheStoreError::Backend(Box::new(e)))
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheStoreError> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn
            .get(key)
            .await
            .map_err(|e| CacheStoreError::Backend(Box::new(e)))?;
        Ok(value)
    }

    async fn put(
        &self,
        key: &str,
        value: String,
        expiration_ttl: Option<Duration>,
    ) -> Result<(), CacheStoreError> {
        let mut conn = self.connection().await?;
        match expiration_ttl {
            Some(ttl) => {
                // Redis expiry has second resolution; never round down to an
                // immediately-expired key.
                let seconds = ttl.as_secs().max(1);
                let _: () = conn
                    .set_ex(key, value, seconds)
                    .await
                    .map_err(|e| CacheStoreError::Backend(Box::new(e)))?;
            }
            None => {
                let _: () = conn
                    .set(key, value)
                    .await
                    .map_err(|e| CacheStoreError::Backend(Box::new(e)))?;
            }
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheStoreError> {
        let mut conn = self.connection().await?;
        let _: () = conn
            .del(key)
            .await
            .map_err(|e| CacheStoreError::Backend(Box::new(e)))?;
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, CacheStoreError> {
        let mut conn = self.connection().await?;
        let keys: Vec<String> = conn
            .keys(format!("{prefix}*"))
            .await
            .map_err(|e| CacheStoreError::Backend(Box::new(e)))?;
        Ok(keys)
    }
}

/// In-memory store with lazy TTL expiry, for tests and embedded use.
#[derive(Debug, Default)]
pub struct InMemoryKvStore {
    entries: DashMap<String, (String, Option<Instant>)>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn is_expired(expires_at: &Option<Instant>) -> bool {
        matches!(expires_at, Some(at) if *at <= Instant::now())
    }

    /// Number of stored entries including not-yet-collected expired ones
    /// (test visibility)
    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheStoreError> {
        if let Some(entry) = self.entries.get(key) {
            let (value, expires_at) = entry.value();
            if Self::is_expired(expires_at) {
                drop(entry);
                self.entries.remove(key);
                return Ok(None);
            }
            return Ok(Some(value.clone()));
        }
        Ok(None)
    }

    async fn put(
        &self,
        key: &str,
        value: String,
        expiration_ttl: Option<Duration>,
    ) -> Result<(), CacheStoreError> {
        let expires_at = expiration_ttl.map(|ttl| Instant::now() + ttl);
        self.entries.insert(key.to_string(), (value, expires_at));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheStoreError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, CacheStoreError> {
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.key().starts_with(prefix) && !Self::is_expired(&entry.value().1))
            .map(|entry| entry.key().clone())
            .collect())
    }
}
