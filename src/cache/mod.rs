//! # Tag-Indexed Cache
//!
//! TTL-based key/value caching over an external store, with a secondary
//! tag → keys index enabling bulk invalidation by semantic tag.
//!
//! Caching here is an optimization, never a hard dependency: every failure
//! talking to the backing store is swallowed and treated as a miss or
//! no-op, so callers always get correct results — just without the speedup
//! when the store is unhealthy.

pub mod keys;
pub mod store;
pub mod tagged;

pub use store::{InMemoryKvStore, KvStore, RedisKvStore};
pub use tagged::{CacheSetOptions, TagIndexedCache, WarmEntry};
