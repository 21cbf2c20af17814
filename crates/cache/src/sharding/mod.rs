//! Sharded cacher
//!
//! One generic cacher facade over several independent backends. Each batch
//! is assigned to shard groups with a single call to the
//! [`ShardAssignment`], every group is resolved to its backend, and one call
//! per group runs concurrently. Any failing shard fails the whole batch.

mod assignment;

pub use assignment::{FnShardAssignment, ModuloShardAssignment, ShardAssignment, ShardGroup};

use crate::keys::PartsKeyBuilder;
use crate::result::CacheLoadResult;
use crate::traits::{CacheValue, GenericCacher};
use async_trait::async_trait;
use entcache_core::{CacheConfig, CacheError, Result};
use entcache_utils::tracing::batch_span;
use futures::future::try_join_all;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use tracing::instrument::Instrumented;
use tracing::{debug, instrument, Instrument};

/// Resolves a shard group to the backend that owns it
pub type ShardResolver<V, G> =
    Arc<dyn Fn(&G) -> Option<Arc<dyn GenericCacher<V>>> + Send + Sync>;

/// Resolver over a fixed list of backends, indexed by shard group
pub fn indexed_resolver<V: CacheValue>(
    backends: Vec<Arc<dyn GenericCacher<V>>>,
) -> ShardResolver<V, usize> {
    Arc::new(move |group: &usize| backends.get(*group).cloned())
}

#[derive(Debug, Clone)]
pub struct ShardedCacherOptions {
    pub cache_key_prefix: String,
    /// Embedded in every key so two schemes can run side by side
    pub sharding_scheme_version: u32,
    pub delimiter: char,
}

impl ShardedCacherOptions {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            cache_key_prefix: config.cache_key_prefix.clone(),
            sharding_scheme_version: config.sharding_scheme_version,
            delimiter: config.key_delimiter,
        }
    }
}

impl Default for ShardedCacherOptions {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

pub struct ShardedCacher<V: CacheValue, G: ShardGroup> {
    assignment: Arc<dyn ShardAssignment<G>>,
    resolver: ShardResolver<V, G>,
    namespace: [String; 2],
    key_builder: PartsKeyBuilder,
    name: String,
}

/// Keys routed to one backend
struct ShardBatch<V: CacheValue> {
    cacher: Arc<dyn GenericCacher<V>>,
    keys: Vec<String>,
}

impl<V: CacheValue> ShardBatch<V> {
    /// Attach the per-shard span to one backend call
    fn run<F: Future>(&self, operation: &'static str, call: F) -> Instrumented<F> {
        call.instrument(batch_span(operation, self.cacher.tier_name(), self.keys.len()))
    }
}

impl<V: CacheValue, G: ShardGroup> ShardedCacher<V, G> {
    pub fn new(
        name: impl Into<String>,
        assignment: Arc<dyn ShardAssignment<G>>,
        resolver: ShardResolver<V, G>,
        options: ShardedCacherOptions,
    ) -> Result<Self> {
        Ok(Self {
            key_builder: PartsKeyBuilder::new(options.delimiter)?,
            namespace: [
                options.cache_key_prefix,
                options.sharding_scheme_version.to_string(),
            ],
            assignment,
            resolver,
            name: name.into(),
        })
    }

    async fn partition(&self, keys: &[String]) -> Result<Vec<ShardBatch<V>>> {
        let mut seen = HashSet::with_capacity(keys.len());
        let unique: Vec<String> = keys
            .iter()
            .filter(|key| seen.insert(key.as_str()))
            .cloned()
            .collect();

        let assigned = self.assignment.assign(&unique).await?;

        let mut grouped: HashMap<G, Vec<String>> = HashMap::new();
        for key in unique {
            let group = assigned.get(&key).ok_or_else(|| {
                CacheError::configuration(format!("no shard group assigned for key '{key}'"))
            })?;
            grouped.entry(group.clone()).or_default().push(key);
        }

        grouped
            .into_iter()
            .map(|(group, keys)| {
                let cacher = (self.resolver)(&group).ok_or_else(|| {
                    CacheError::configuration(format!("no backend for shard group {group:?}"))
                })?;
                debug!(tier = %self.name, shard = ?group, keys = keys.len(), "routing shard batch");
                Ok(ShardBatch { cacher, keys })
            })
            .collect()
    }
}

#[async_trait]
impl<V: CacheValue, G: ShardGroup> GenericCacher<V> for ShardedCacher<V, G> {
    #[instrument(skip_all, fields(tier = %self.name, keys = keys.len()))]
    async fn load_many(&self, keys: &[String]) -> Result<HashMap<String, CacheLoadResult<V>>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let batches = self.partition(keys).await?;
        let loaded = try_join_all(
            batches
                .iter()
                .map(|batch| batch.run("load_many", batch.cacher.load_many(&batch.keys))),
        )
        .await?;

        let mut merged = HashMap::with_capacity(keys.len());
        for (batch, mut results) in batches.iter().zip(loaded) {
            for key in &batch.keys {
                let result = results.remove(key).unwrap_or(CacheLoadResult::Miss);
                merged.insert(key.clone(), result);
            }
        }
        Ok(merged)
    }

    #[instrument(skip_all, fields(tier = %self.name, keys = entries.len()))]
    async fn cache_many(&self, entries: &HashMap<String, V>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let keys: Vec<String> = entries.keys().cloned().collect();
        let batches = self.partition(&keys).await?;
        let per_shard: Vec<(Arc<dyn GenericCacher<V>>, HashMap<String, V>)> = batches
            .into_iter()
            .map(|batch| {
                let subset = batch
                    .keys
                    .into_iter()
                    .filter_map(|key| entries.get(&key).cloned().map(|value| (key, value)))
                    .collect();
                (batch.cacher, subset)
            })
            .collect();

        try_join_all(
            per_shard
                .iter()
                .map(|(cacher, subset)| {
                    cacher
                        .cache_many(subset)
                        .instrument(batch_span("cache_many", cacher.tier_name(), subset.len()))
                }),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip_all, fields(tier = %self.name, keys = keys.len()))]
    async fn cache_misses(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let batches = self.partition(keys).await?;
        try_join_all(
            batches
                .iter()
                .map(|batch| batch.run("cache_misses", batch.cacher.cache_misses(&batch.keys))),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip_all, fields(tier = %self.name, keys = keys.len()))]
    async fn invalidate_many(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let batches = self.partition(keys).await?;
        try_join_all(
            batches
                .iter()
                .map(|batch| {
                    batch.run("invalidate_many", batch.cacher.invalidate_many(&batch.keys))
                }),
        )
        .await?;
        Ok(())
    }

    fn make_key(&self, parts: &[&str]) -> String {
        let inner = self.key_builder.build(parts);
        self.key_builder.prefixed(&self.namespace, &inner)
    }

    fn tier_name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{LocalMemoryCacher, RedisCacher, RedisCacherOptions};
    use crate::result::CacheStatus;
    use crate::testing::{CountingCacher, InMemoryRedisClient};
    use entcache_core::TransientReason;
    use std::time::Duration;
    use tokio::time::Instant;

    struct Fixture {
        shards: Vec<Arc<CountingCacher<String>>>,
        cacher: ShardedCacher<String, usize>,
    }

    fn fixture(shard_count: usize) -> Fixture {
        let shards: Vec<Arc<CountingCacher<String>>> = (0..shard_count)
            .map(|i| {
                Arc::new(CountingCacher::new(Arc::new(LocalMemoryCacher::no_op(format!(
                    "shard-{i}"
                )))))
            })
            .collect();
        let backends: Vec<Arc<dyn GenericCacher<String>>> = shards
            .iter()
            .map(|shard| Arc::clone(shard) as Arc<dyn GenericCacher<String>>)
            .collect();
        let cacher = ShardedCacher::new(
            "sharded",
            Arc::new(ModuloShardAssignment::new(shard_count).unwrap()),
            indexed_resolver(backends),
            ShardedCacherOptions {
                cache_key_prefix: "app".to_string(),
                sharding_scheme_version: 2,
                delimiter: ':',
            },
        )
        .unwrap();
        Fixture { shards, cacher }
    }

    fn redis_shards(
        shard_count: usize,
    ) -> (Vec<Arc<InMemoryRedisClient>>, ShardedCacher<String, usize>) {
        let clients: Vec<Arc<InMemoryRedisClient>> = (0..shard_count)
            .map(|_| Arc::new(InMemoryRedisClient::new()))
            .collect();
        let backends: Vec<Arc<dyn GenericCacher<String>>> = clients
            .iter()
            .enumerate()
            .map(|(i, client)| {
                let cacher: RedisCacher<String> = RedisCacher::new(
                    format!("redis-{i}"),
                    Arc::clone(client) as Arc<dyn crate::backend::RedisClient>,
                    RedisCacherOptions::default(),
                )
                .unwrap();
                Arc::new(cacher) as Arc<dyn GenericCacher<String>>
            })
            .collect();
        let cacher = ShardedCacher::new(
            "sharded",
            Arc::new(ModuloShardAssignment::new(shard_count).unwrap()),
            indexed_resolver(backends),
            ShardedCacherOptions::default(),
        )
        .unwrap();
        (clients, cacher)
    }

    #[test]
    fn key_embeds_prefix_and_scheme_version() {
        let fixture = fixture(2);
        assert_eq!(
            fixture.cacher.make_key(&["users", "v1", "id", "7"]),
            "app:2:users:v1:id:7"
        );
    }

    #[tokio::test]
    async fn one_call_per_group_and_one_result_per_key() {
        let fixture = fixture(3);
        let keys: Vec<String> = (0..50).map(|i| format!("key-{i}")).collect();

        let loaded = fixture.cacher.load_many(&keys).await.unwrap();

        assert_eq!(loaded.len(), keys.len());
        assert!(loaded.values().all(|r| r.status() == CacheStatus::Miss));
        let calls: usize = fixture.shards.iter().map(|s| s.load_calls()).sum();
        assert_eq!(calls, 3);
        let keys_seen: usize = fixture.shards.iter().map(|s| s.keys_loaded()).sum();
        assert_eq!(keys_seen, 50);
    }

    #[tokio::test(start_paused = true)]
    async fn shard_round_trips_overlap() {
        let latency = Duration::from_millis(100);
        let (clients, cacher) = redis_shards(4);
        for client in &clients {
            client.set_latency(latency);
        }
        let keys: Vec<String> = (0..64).map(|i| format!("key-{i}")).collect();

        let started = Instant::now();
        let loaded = cacher.load_many(&keys).await.unwrap();
        let elapsed = started.elapsed();

        assert_eq!(loaded.len(), keys.len());
        assert!(clients.iter().all(|client| client.calls("mget") == 1));
        assert!(elapsed >= latency);
        assert!(elapsed < latency * 2, "shard calls ran one after another: {elapsed:?}");

        let entries: HashMap<String, String> =
            keys.iter().map(|key| (key.clone(), "v".to_string())).collect();
        let started = Instant::now();
        cacher.cache_many(&entries).await.unwrap();
        assert!(started.elapsed() < latency * 2);
        assert_eq!(clients.iter().map(|client| client.len()).sum::<usize>(), keys.len());
    }

    #[tokio::test(start_paused = true)]
    async fn failing_shard_fails_writes_without_waiting() {
        let (clients, cacher) = redis_shards(2);
        clients[0].set_latency(Duration::from_millis(300));
        clients[1].fail_with(TransientReason::Connection);
        let entries: HashMap<String, String> = (0..20)
            .map(|i| (format!("key-{i}"), format!("value-{i}")))
            .collect();

        let started = Instant::now();
        let error = cacher.cache_many(&entries).await.unwrap_err();

        assert!(error.is_transient());
        assert!(started.elapsed() < Duration::from_millis(300));
        assert_eq!(clients[1].calls("set"), 1);
        assert!(clients[1].is_empty());
    }

    #[tokio::test]
    async fn duplicate_keys_are_sent_once() {
        let fixture = fixture(1);
        let keys = vec!["a".to_string(), "a".to_string()];
        let loaded = fixture.cacher.load_many(&keys).await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(fixture.shards[0].keys_loaded(), 1);
    }

    #[tokio::test]
    async fn failing_shard_fails_the_batch() {
        let fixture = fixture(2);
        fixture.shards[1].fail_reads(true);
        let keys: Vec<String> = (0..20).map(|i| format!("key-{i}")).collect();

        let error = fixture.cacher.load_many(&keys).await.unwrap_err();
        assert!(error.is_transient());
    }

    #[tokio::test]
    async fn unassigned_key_is_a_configuration_error() {
        let assignment = FnShardAssignment::new(|key: &str| (key != "orphan").then_some(0usize));
        let backend: Arc<dyn GenericCacher<String>> =
            Arc::new(LocalMemoryCacher::no_op("shard-0"));
        let cacher = ShardedCacher::new(
            "sharded",
            Arc::new(assignment),
            indexed_resolver(vec![backend]),
            ShardedCacherOptions::default(),
        )
        .unwrap();

        let error = cacher
            .invalidate_many(&["ok".to_string(), "orphan".to_string()])
            .await
            .unwrap_err();
        assert!(error.is_configuration());
    }

    #[tokio::test]
    async fn unresolvable_group_is_a_configuration_error() {
        let cacher: ShardedCacher<String, usize> = ShardedCacher::new(
            "sharded",
            Arc::new(FnShardAssignment::new(|_: &str| Some(9usize))),
            indexed_resolver(Vec::new()),
            ShardedCacherOptions::default(),
        )
        .unwrap();

        let error = cacher.cache_misses(&["k".to_string()]).await.unwrap_err();
        assert!(error.is_configuration());
    }

    #[tokio::test]
    async fn empty_batches_skip_assignment() {
        let fixture = fixture(2);
        assert!(fixture.cacher.load_many(&[]).await.unwrap().is_empty());
        fixture.cacher.cache_many(&HashMap::new()).await.unwrap();
        let calls: usize = fixture.shards.iter().map(|s| s.total_calls()).sum();
        assert_eq!(calls, 0);
    }
}
