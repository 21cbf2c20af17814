//! Entity cache for entcache
//!
//! Read-through and write-through caching between an entity loader and a
//! system of record:
//! - Batch generic cacher contract over opaque string keys
//! - Escaped, collision-free keys built from ordered parts
//! - Local memory (bounded LRU with TTLs) and Redis tiers
//! - Sharding across backend instances and multi-tier composition
//! - Negative caching of confirmed-absent rows
//! - Invalidation deferred until the enclosing transaction commits

pub mod backend;
pub mod composed;
pub mod context;
pub mod entity;
pub mod keys;
pub mod metrics;
pub mod result;
pub mod secondary;
pub mod sharding;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;
pub mod traits;

pub use backend::{
    LocalMemoryCacheRegistry, LocalMemoryCacher, LocalMemoryOptions, RedisCacher,
    RedisCacherOptions, RedisClient,
};
pub use composed::ComposedCacher;
pub use context::{
    callback, run_in_transaction, Callback, CallbackKind, QueryContext, TransactionHandle,
    TransactionScope,
};
pub use entity::{
    EntityCacheAdapter, EntityCacheInvalidator, EntityConfiguration, EntityFields,
    ReadThroughEntityCache, RecordFetcher,
};
pub use keys::PartsKeyBuilder;
pub use metrics::{CacheMetrics, NoopCacheMetrics, PrometheusCacheMetrics};
pub use result::{CacheLoadResult, CacheStatus};
pub use secondary::SecondaryEntityCache;
pub use sharding::{
    indexed_resolver, FnShardAssignment, ModuloShardAssignment, ShardAssignment, ShardResolver,
    ShardedCacher, ShardedCacherOptions,
};
pub use traits::{CacheValue, GenericCacher};

pub use entcache_core::{
    BackendKind, CacheConfig, CacheConfigLoader, CacheError, InvalidationStrategy, Result,
    TransactionPhase, TransientReason,
};
