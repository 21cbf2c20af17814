//! The generic cacher contract implemented by every tier

use crate::result::CacheLoadResult;
use async_trait::async_trait;
use entcache_core::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;

/// Values that can be stored in any tier
///
/// Tiers clone values they keep in process and serialize values they send
/// to a remote store.
pub trait CacheValue: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// Batch cache operations over opaque string keys.
///
/// Implementations must:
/// - return exactly one result per distinct input key from `load_many`
/// - return without touching the backend when given an empty batch
/// - treat invalidation of an absent key as success
/// - report connection, timeout and protocol failures as
///   [`CacheError::Transient`](entcache_core::CacheError::Transient), never as a miss
#[async_trait]
pub trait GenericCacher<V: CacheValue>: Send + Sync {
    /// Look up every key
    async fn load_many(&self, keys: &[String]) -> Result<HashMap<String, CacheLoadResult<V>>>;

    /// Store positive entries with the tier's positive TTL
    async fn cache_many(&self, entries: &HashMap<String, V>) -> Result<()>;

    /// Store the negative sentinel for each key with the tier's negative TTL
    async fn cache_misses(&self, keys: &[String]) -> Result<()>;

    /// Remove each key whatever its current state
    async fn invalidate_many(&self, keys: &[String]) -> Result<()>;

    /// Build the storage key this tier uses for the given parts
    fn make_key(&self, parts: &[&str]) -> String;

    /// Short label used in logs and metrics
    fn tier_name(&self) -> &str;
}
