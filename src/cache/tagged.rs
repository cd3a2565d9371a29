//! # Tag-Indexed TTL Cache
//!
//! Entries are stored as a serialized envelope `{data, timestamp, version}`
//! with the store's native expiry as the primary TTL mechanism and a
//! client-side staleness check against the configured default TTL as
//! belt-and-suspenders. A secondary `tag:<name>` index maps each tag to the
//! set of keys carrying it, enabling bulk invalidation.
//!
//! The tag index is an optimization structure, not a correctness-critical
//! one: updates are read-modify-write with last-writer-wins, dangling
//! references are tolerated and cleaned lazily.

use crate::cache::keys::tag_index_key;
use crate::cache::store::KvStore;
use crate::config::CacheSettings;
use crate::error::CacheStoreError;
use crate::logging::log_cache_operation;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Per-entry write options.
#[derive(Debug, Clone, Default)]
pub struct CacheSetOptions {
    /// Native store expiry; falls back to the configured default TTL
    pub ttl: Option<Duration>,
    /// Application-level schema version stamped into the envelope
    pub version: Option<String>,
    /// Tags to index this key under
    pub tags: Vec<String>,
}

impl CacheSetOptions {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// One entry for bulk population via [`TagIndexedCache::warm`].
#[derive(Debug, Clone)]
pub struct WarmEntry {
    pub key: String,
    pub data: serde_json::Value,
    pub options: CacheSetOptions,
}

/// Serialized cache entry. The version tag is application-level metadata;
/// the cache itself ignores it.
#[derive(Debug, Serialize, Deserialize)]
struct CacheEnvelope {
    data: serde_json::Value,
    /// Creation time, unix milliseconds
    timestamp: i64,
    version: String,
    /// Effective TTL at write time; entries written before this field
    /// existed fall back to the configured default.
    #[serde(default)]
    ttl_ms: Option<u64>,
}

/// TTL cache with tag-based bulk invalidation over an external KV store.
///
/// Every backing-store failure is swallowed and degrades to a miss or
/// no-op; callers always get correct results, just uncached.
pub struct TagIndexedCache<S> {
    store: Arc<S>,
    settings: CacheSettings,
}

impl<S: KvStore + 'static> TagIndexedCache<S> {
    pub fn new(store: Arc<S>, settings: CacheSettings) -> Self {
        Self { store, settings }
    }

    /// The backing store handle
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Fetch and deserialize a cached value. Missing, expired, corrupt, or
    /// unreachable entries all read as `None`; expired and corrupt entries
    /// are deleted best-effort in the background.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !self.settings.enabled {
            return None;
        }

        let raw = match self.store.get(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                log_cache_operation("get", key, "miss", None);
                return None;
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };

        let envelope: CacheEnvelope = match serde_json::from_str(&raw) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(key = %key, error = %e, "Corrupt cache entry, evicting");
                self.delete_in_background(key);
                return None;
            }
        };

        let age_ms = Utc::now().timestamp_millis() - envelope.timestamp;
        let ttl_ms = envelope
            .ttl_ms
            .map_or_else(|| self.settings.default_ttl().as_millis() as i64, |ms| ms as i64);
        if age_ms >= ttl_ms {
            log_cache_operation("get", key, "expired", None);
            self.delete_in_background(key);
            return None;
        }

        match serde_json::from_value(envelope.data) {
            Ok(value) => {
                log_cache_operation("get", key, "hit", None);
                Some(value)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cache entry failed to deserialize, evicting");
                self.delete_in_background(key);
                None
            }
        }
    }

    /// Serialize and store a value, registering it under each tag in
    /// `options.tags`. Failures are swallowed: callers never fail because
    /// the cache could not be written.
    pub async fn set<T: Serialize>(&self, key: &str, data: &T, options: CacheSetOptions) {
        if let Err(e) = self.try_set(key, data, options).await {
            warn!(key = %key, error = %e, "Cache write failed, continuing uncached");
        }
    }

    async fn try_set<T: Serialize>(
        &self,
        key: &str,
        data: &T,
        options: CacheSetOptions,
    ) -> Result<(), CacheStoreError> {
        if !self.settings.enabled {
            return Ok(());
        }

        let ttl = options.ttl.unwrap_or_else(|| self.settings.default_ttl());
        let envelope = CacheEnvelope {
            data: serde_json::to_value(data)?,
            timestamp: Utc::now().timestamp_millis(),
            version: options
                .version
                .unwrap_or_else(|| self.settings.version.clone()),
            ttl_ms: Some(ttl.as_millis() as u64),
        };

        self.store
            .put(key, serde_json::to_string(&envelope)?, Some(ttl))
            .await?;
        log_cache_operation("set", key, "written", None);

        for tag in options.tags {
            self.append_to_tag_index(&tag, key).await;
        }

        Ok(())
    }

    /// Read-modify-write append of `key` to the tag's index entry.
    /// Last-writer-wins is acceptable here: a lost append costs a redundant
    /// fetch later, never a wrong result.
    async fn append_to_tag_index(&self, tag: &str, key: &str) {
        let index_key = tag_index_key(tag);

        let mut keys: Vec<String> = match self.store.get(&index_key).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_default(),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(tag = %tag, error = %e, "Tag index read failed, skipping index update");
                return;
            }
        };

        if !keys.iter().any(|k| k == key) {
            keys.push(key.to_string());
            let serialized = match serde_json::to_string(&keys) {
                Ok(s) => s,
                Err(e) => {
                    warn!(tag = %tag, error = %e, "Tag index serialization failed");
                    return;
                }
            };
            if let Err(e) = self.store.put(&index_key, serialized, None).await {
                warn!(tag = %tag, error = %e, "Tag index write failed");
            }
        }
    }

    /// Remove a single entry. Tag indices are not scrubbed; stale
    /// references are cleaned lazily by invalidation and expiry.
    pub async fn delete(&self, key: &str) {
        if let Err(e) = self.store.delete(key).await {
            warn!(key = %key, error = %e, "Cache delete failed");
        }
    }

    fn delete_in_background(&self, key: &str) {
        let store = self.store.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            let _ = store.delete(&key).await;
        });
    }

    /// Delete every key registered under `tag`, then the tag index entry
    /// itself. A non-existent tag is a no-op.
    pub async fn invalidate_by_tag(&self, tag: &str) {
        let index_key = tag_index_key(tag);

        let keys: Vec<String> = match self.store.get(&index_key).await {
            Ok(Some(raw)) => serde_json::from_str(&raw).unwrap_or_default(),
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(tag = %tag, error = %e, "Tag index read failed, skipping invalidation");
                return;
            }
        };

        for key in &keys {
            if let Err(e) = self.store.delete(key).await {
                warn!(tag = %tag, key = %key, error = %e, "Tagged key delete failed");
            }
        }

        if let Err(e) = self.store.delete(&index_key).await {
            warn!(tag = %tag, error = %e, "Tag index delete failed");
        }

        let invalidated = keys.len().to_string();
        log_cache_operation("invalidate_by_tag", tag, "done", Some(invalidated.as_str()));
    }

    /// Invalidate several tags, each independently.
    pub async fn invalidate_by_tags(&self, tags: &[String]) {
        for tag in tags {
            self.invalidate_by_tag(tag).await;
        }
    }

    /// Return the cached value for `key`, or invoke `factory` exactly once,
    /// cache its result, and return it. The factory's error propagates
    /// unchanged; cache write failures do not.
    pub async fn get_or_set<T, E, F, Fut>(
        &self,
        key: &str,
        options: CacheSetOptions,
        factory: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(cached) = self.get::<T>(key).await {
            return Ok(cached);
        }

        let value = factory().await?;
        self.set(key, &value, options).await;
        Ok(value)
    }

    /// Bulk-populate multiple entries. A failure writing one entry never
    /// prevents the others; returns the number written.
    pub async fn warm(&self, entries: Vec<WarmEntry>) -> usize {
        let mut written = 0;
        for entry in entries {
            match self.try_set(&entry.key, &entry.data, entry.options).await {
                Ok(()) => written += 1,
                Err(e) => {
                    warn!(key = %entry.key, error = %e, "Warm entry failed, continuing");
                }
            }
        }
        written
    }
}
