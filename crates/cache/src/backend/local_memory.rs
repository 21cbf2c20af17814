//! In-process LRU tier with per-entry TTL and byte accounting

use crate::keys::PartsKeyBuilder;
use crate::result::CacheLoadResult;
use crate::traits::{CacheValue, GenericCacher};
use async_trait::async_trait;
use entcache_core::{CacheConfig, Result};
use lru::LruCache;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

// Expiry used when `now + ttl` does not fit in an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(100 * 365 * 86_400);

/// Computes the accounted size of a cached value in bytes
pub type ValueSizer<V> = Arc<dyn Fn(&V) -> u64 + Send + Sync>;

/// Options for a local memory tier
#[derive(Debug, Clone)]
pub struct LocalMemoryOptions {
    /// Maximum number of entries; zero disables storage entirely
    pub max_entries: usize,
    /// Maximum accounted bytes across all entries
    pub max_size_bytes: u64,
    pub positive_ttl: Duration,
    pub negative_ttl: Duration,
    /// Parts placed before every key built by `make_key`
    pub namespace: Vec<String>,
    pub delimiter: char,
}

impl LocalMemoryOptions {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            max_entries: config.local_max_entries,
            max_size_bytes: config.local_max_size_bytes,
            positive_ttl: config.positive_ttl(),
            negative_ttl: config.negative_ttl(),
            namespace: vec![config.cache_key_prefix.clone()],
            delimiter: config.key_delimiter,
        }
    }
}

impl Default for LocalMemoryOptions {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

enum LocalValue<V> {
    Positive(V),
    Negative,
}

struct LocalEntry<V> {
    value: LocalValue<V>,
    expires_at: Instant,
    size: u64,
}

struct LruStore<V> {
    entries: LruCache<String, LocalEntry<V>>,
    size_bytes: u64,
}

impl<V> LruStore<V> {
    fn remove(&mut self, key: &str) {
        if let Some(entry) = self.entries.pop(key) {
            self.size_bytes -= entry.size;
        }
    }

    fn insert(&mut self, key: String, entry: LocalEntry<V>, max_size_bytes: u64) -> u64 {
        if entry.size > max_size_bytes {
            // An entry that can never fit must not leave an older value behind
            self.remove(&key);
            return 0;
        }

        let size = entry.size;
        let mut evicted = 0;
        if let Some((old_key, old_entry)) = self.entries.push(key.clone(), entry) {
            self.size_bytes -= old_entry.size;
            if old_key != key {
                evicted += 1;
            }
        }
        self.size_bytes += size;

        while self.size_bytes > max_size_bytes {
            match self.entries.pop_lru() {
                Some((_, old_entry)) => {
                    self.size_bytes -= old_entry.size;
                    evicted += 1;
                }
                None => break,
            }
        }
        evicted
    }
}

/// Bounded in-process cache tier.
///
/// Safe for concurrent use: every batch takes the store lock once and never
/// holds it across an await point. Both the entry count and the accounted
/// byte size are hard limits; least recently used entries are evicted first.
pub struct LocalMemoryCacher<V: CacheValue> {
    store: Option<Mutex<LruStore<V>>>,
    options: LocalMemoryOptions,
    key_builder: PartsKeyBuilder,
    sizer: ValueSizer<V>,
    name: String,
}

impl<V: CacheValue> LocalMemoryCacher<V> {
    /// Create a tier whose entry sizes are measured as serialized JSON length
    pub fn new(name: impl Into<String>, options: LocalMemoryOptions) -> Result<Self> {
        Self::with_sizer(name, options, Arc::new(json_size::<V>))
    }

    /// Create a tier with a custom size function
    pub fn with_sizer(
        name: impl Into<String>,
        options: LocalMemoryOptions,
        sizer: ValueSizer<V>,
    ) -> Result<Self> {
        let key_builder = PartsKeyBuilder::new(options.delimiter)?;
        let store = NonZeroUsize::new(options.max_entries).map(|capacity| {
            Mutex::new(LruStore {
                entries: LruCache::new(capacity),
                size_bytes: 0,
            })
        });
        Ok(Self {
            store,
            options,
            key_builder,
            sizer,
            name: name.into(),
        })
    }

    /// A tier that never stores anything; every load is a miss
    pub fn no_op(name: impl Into<String>) -> Self {
        Self {
            store: None,
            options: LocalMemoryOptions {
                max_entries: 0,
                max_size_bytes: 0,
                namespace: Vec::new(),
                ..LocalMemoryOptions::default()
            },
            key_builder: PartsKeyBuilder::default(),
            sizer: Arc::new(|_| 0),
            name: name.into(),
        }
    }

    /// Number of live or not-yet-reaped entries
    pub fn len(&self) -> usize {
        self.store.as_ref().map_or(0, |s| s.lock().entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Accounted bytes currently held
    pub fn size_bytes(&self) -> u64 {
        self.store.as_ref().map_or(0, |s| s.lock().size_bytes)
    }

    pub fn clear(&self) {
        if let Some(store) = &self.store {
            let mut store = store.lock();
            store.entries.clear();
            store.size_bytes = 0;
        }
    }

    fn write(&self, entries: Vec<(String, LocalValue<V>, u64)>, ttl: Duration) {
        let Some(store) = &self.store else {
            return;
        };
        let now = Instant::now();
        let expires_at = now.checked_add(ttl).unwrap_or(now + FAR_FUTURE);
        let mut store = store.lock();
        let mut evicted = 0;
        for (key, value, value_size) in entries {
            let size = key.len() as u64 + value_size;
            evicted += store.insert(
                key,
                LocalEntry {
                    value,
                    expires_at,
                    size,
                },
                self.options.max_size_bytes,
            );
        }
        if evicted > 0 {
            tracing::debug!(tier = %self.name, evicted, "evicted local memory entries");
        }
    }
}

fn json_size<V: CacheValue>(value: &V) -> u64 {
    serde_json::to_vec(value).map_or(0, |bytes| bytes.len() as u64)
}

#[async_trait]
impl<V: CacheValue> GenericCacher<V> for LocalMemoryCacher<V> {
    async fn load_many(&self, keys: &[String]) -> Result<HashMap<String, CacheLoadResult<V>>> {
        let mut results = HashMap::with_capacity(keys.len());
        let Some(store) = &self.store else {
            for key in keys {
                results.insert(key.clone(), CacheLoadResult::Miss);
            }
            return Ok(results);
        };
        if keys.is_empty() {
            return Ok(results);
        }

        let now = Instant::now();
        let mut store = store.lock();
        for key in keys {
            let result = match store.entries.get(key) {
                Some(entry) if entry.expires_at <= now => None,
                Some(entry) => Some(match &entry.value {
                    LocalValue::Positive(value) => CacheLoadResult::Hit(value.clone()),
                    LocalValue::Negative => CacheLoadResult::Negative,
                }),
                None => Some(CacheLoadResult::Miss),
            };
            let result = match result {
                Some(result) => result,
                None => {
                    store.remove(key);
                    CacheLoadResult::Miss
                }
            };
            results.insert(key.clone(), result);
        }
        Ok(results)
    }

    async fn cache_many(&self, entries: &HashMap<String, V>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let sized = entries
            .iter()
            .map(|(key, value)| {
                let size = (self.sizer)(value);
                (key.clone(), LocalValue::Positive(value.clone()), size)
            })
            .collect();
        self.write(sized, self.options.positive_ttl);
        Ok(())
    }

    async fn cache_misses(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let sized = keys
            .iter()
            .map(|key| (key.clone(), LocalValue::Negative, 0))
            .collect();
        self.write(sized, self.options.negative_ttl);
        Ok(())
    }

    async fn invalidate_many(&self, keys: &[String]) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        if keys.is_empty() {
            return Ok(());
        }
        let mut store = store.lock();
        for key in keys {
            store.remove(key);
        }
        Ok(())
    }

    fn make_key(&self, parts: &[&str]) -> String {
        let inner = self.key_builder.build(parts);
        self.key_builder.prefixed(&self.options.namespace, &inner)
    }

    fn tier_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct User {
        id: String,
        email: String,
    }

    fn options() -> LocalMemoryOptions {
        LocalMemoryOptions {
            namespace: vec!["app".to_string()],
            ..LocalMemoryOptions::default()
        }
    }

    fn user(id: &str) -> User {
        User {
            id: id.to_string(),
            email: format!("{id}@example.com"),
        }
    }

    #[tokio::test]
    async fn hit_then_invalidate_then_miss() {
        let cacher = LocalMemoryCacher::new("local", options()).unwrap();
        let key = cacher.make_key(&["users", "v1", "email", "a@b.com"]);
        assert_eq!(key, "app:users:v1:email:a@b.com");

        let value = User {
            id: "1".to_string(),
            email: "a@b.com".to_string(),
        };
        cacher
            .cache_many(&HashMap::from([(key.clone(), value.clone())]))
            .await
            .unwrap();

        let loaded = cacher.load_many(&[key.clone()]).await.unwrap();
        assert_eq!(loaded[&key], CacheLoadResult::Hit(value));

        cacher.invalidate_many(&[key.clone()]).await.unwrap();
        let loaded = cacher.load_many(&[key.clone()]).await.unwrap();
        assert_eq!(loaded[&key], CacheLoadResult::Miss);
    }

    #[tokio::test]
    async fn repeated_negative_caching_is_idempotent() {
        let cacher: LocalMemoryCacher<User> = LocalMemoryCacher::new("local", options()).unwrap();
        let key = cacher.make_key(&["users", "v1", "id", "404"]);

        cacher.cache_misses(&[key.clone()]).await.unwrap();
        cacher.cache_misses(&[key.clone()]).await.unwrap();

        let loaded = cacher.load_many(&[key.clone()]).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[&key], CacheLoadResult::Negative);
        assert_eq!(cacher.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn negative_entries_expire_before_positive_ones() {
        let cacher = LocalMemoryCacher::new(
            "local",
            LocalMemoryOptions {
                positive_ttl: Duration::from_secs(86_400),
                negative_ttl: Duration::from_secs(600),
                ..options()
            },
        )
        .unwrap();
        let present = cacher.make_key(&["users", "v1", "id", "1"]);
        let absent = cacher.make_key(&["users", "v1", "id", "2"]);

        cacher
            .cache_many(&HashMap::from([(present.clone(), user("1"))]))
            .await
            .unwrap();
        cacher.cache_misses(&[absent.clone()]).await.unwrap();

        tokio::time::advance(Duration::from_secs(601)).await;
        let loaded = cacher
            .load_many(&[present.clone(), absent.clone()])
            .await
            .unwrap();
        assert_eq!(loaded[&present].status(), crate::result::CacheStatus::Hit);
        assert_eq!(loaded[&absent], CacheLoadResult::Miss);

        tokio::time::advance(Duration::from_secs(86_400)).await;
        let loaded = cacher.load_many(&[present.clone()]).await.unwrap();
        assert_eq!(loaded[&present], CacheLoadResult::Miss);
        assert!(cacher.is_empty());
    }

    #[tokio::test]
    async fn unrepresentable_ttl_saturates() {
        let cacher = LocalMemoryCacher::new(
            "local",
            LocalMemoryOptions {
                positive_ttl: Duration::MAX,
                negative_ttl: Duration::MAX,
                ..options()
            },
        )
        .unwrap();
        let present = cacher.make_key(&["users", "v1", "id", "1"]);
        let absent = cacher.make_key(&["users", "v1", "id", "2"]);

        cacher
            .cache_many(&HashMap::from([(present.clone(), user("1"))]))
            .await
            .unwrap();
        cacher.cache_misses(&[absent.clone()]).await.unwrap();

        let loaded = cacher.load_many(&[present.clone(), absent.clone()]).await.unwrap();
        assert_eq!(loaded[&present], CacheLoadResult::Hit(user("1")));
        assert_eq!(loaded[&absent], CacheLoadResult::Negative);
    }

    #[tokio::test]
    async fn entry_count_is_bounded() {
        let cacher = LocalMemoryCacher::new(
            "local",
            LocalMemoryOptions {
                max_entries: 2,
                ..options()
            },
        )
        .unwrap();
        let entries: HashMap<String, User> = (0..5)
            .map(|i| (format!("k{i}"), user(&i.to_string())))
            .collect();
        cacher.cache_many(&entries).await.unwrap();
        assert_eq!(cacher.len(), 2);
    }

    #[tokio::test]
    async fn byte_size_is_bounded_and_lru_evicted() {
        let cacher = LocalMemoryCacher::with_sizer(
            "local",
            LocalMemoryOptions {
                max_size_bytes: 30,
                ..options()
            },
            Arc::new(|_: &User| 10),
        )
        .unwrap();

        // Each entry accounts for 2 key bytes + 10 value bytes
        for key in ["k1", "k2"] {
            cacher
                .cache_many(&HashMap::from([(key.to_string(), user(key))]))
                .await
                .unwrap();
        }
        // Touch k1 so k2 becomes least recently used
        cacher.load_many(&["k1".to_string()]).await.unwrap();
        cacher
            .cache_many(&HashMap::from([("k3".to_string(), user("k3"))]))
            .await
            .unwrap();

        assert_eq!(cacher.size_bytes(), 24);
        let loaded = cacher
            .load_many(&["k1".to_string(), "k2".to_string(), "k3".to_string()])
            .await
            .unwrap();
        assert_eq!(loaded["k1"].status(), crate::result::CacheStatus::Hit);
        assert_eq!(loaded["k2"], CacheLoadResult::Miss);
        assert_eq!(loaded["k3"].status(), crate::result::CacheStatus::Hit);
    }

    #[tokio::test]
    async fn oversized_entry_replaces_nothing() {
        let cacher = LocalMemoryCacher::with_sizer(
            "local",
            LocalMemoryOptions {
                max_size_bytes: 20,
                ..options()
            },
            Arc::new(|u: &User| if u.id == "big" { 100 } else { 1 }),
        )
        .unwrap();
        cacher
            .cache_many(&HashMap::from([("k".to_string(), user("small"))]))
            .await
            .unwrap();
        cacher
            .cache_many(&HashMap::from([("k".to_string(), user("big"))]))
            .await
            .unwrap();

        let loaded = cacher.load_many(&["k".to_string()]).await.unwrap();
        assert_eq!(loaded["k"], CacheLoadResult::Miss);
        assert_eq!(cacher.size_bytes(), 0);
    }

    #[tokio::test]
    async fn overwrite_keeps_accounting_exact() {
        let cacher = LocalMemoryCacher::with_sizer(
            "local",
            options(),
            Arc::new(|_: &User| 5),
        )
        .unwrap();
        for _ in 0..3 {
            cacher
                .cache_many(&HashMap::from([("key".to_string(), user("1"))]))
                .await
                .unwrap();
        }
        cacher.cache_misses(&["key".to_string()]).await.unwrap();
        assert_eq!(cacher.len(), 1);
        assert_eq!(cacher.size_bytes(), 3);
    }

    #[tokio::test]
    async fn no_op_tier_always_misses() {
        let cacher: LocalMemoryCacher<User> = LocalMemoryCacher::no_op("noop");
        cacher
            .cache_many(&HashMap::from([("k".to_string(), user("1"))]))
            .await
            .unwrap();
        cacher.cache_misses(&["n".to_string()]).await.unwrap();
        let loaded = cacher
            .load_many(&["k".to_string(), "n".to_string()])
            .await
            .unwrap();
        assert_eq!(loaded["k"], CacheLoadResult::Miss);
        assert_eq!(loaded["n"], CacheLoadResult::Miss);
    }

    #[tokio::test]
    async fn empty_batches_are_no_ops() {
        let cacher: LocalMemoryCacher<User> = LocalMemoryCacher::new("local", options()).unwrap();
        assert!(cacher.load_many(&[]).await.unwrap().is_empty());
        cacher.cache_many(&HashMap::new()).await.unwrap();
        cacher.cache_misses(&[]).await.unwrap();
        cacher.invalidate_many(&["absent".to_string()]).await.unwrap();
        assert!(cacher.is_empty());
    }

    #[tokio::test]
    async fn concurrent_writers_keep_bounds() {
        let cacher = Arc::new(
            LocalMemoryCacher::new(
                "local",
                LocalMemoryOptions {
                    max_entries: 64,
                    ..options()
                },
            )
            .unwrap(),
        );
        let mut handles = Vec::new();
        for worker in 0..8 {
            let cacher = Arc::clone(&cacher);
            handles.push(tokio::spawn(async move {
                for i in 0..100 {
                    let key = format!("w{worker}-{i}");
                    cacher
                        .cache_many(&HashMap::from([(key.clone(), user(&key))]))
                        .await
                        .unwrap();
                    cacher.load_many(&[key]).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(cacher.len(), 64);
        assert!(cacher.size_bytes() > 0);
    }
}
