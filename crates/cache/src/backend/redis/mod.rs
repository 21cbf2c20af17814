//! Redis tier: `MGET` for loads, atomic pipelined `SET ... EX` for writes,
//! `DEL` for invalidation
//!
//! Positive values are stored as JSON. Date fields typed as
//! `chrono::DateTime<Utc>` serialize as RFC 3339 (ISO-8601) strings, so they
//! round-trip without a custom transform. Negative entries are the empty
//! string, which no JSON document can be.

mod client;

pub use client::{connect, transient_from_redis, RedisClient};

use crate::keys::PartsKeyBuilder;
use crate::result::CacheLoadResult;
use crate::traits::{CacheValue, GenericCacher};
use async_trait::async_trait;
use entcache_core::{BackendKind, CacheConfig, CacheError, Result, REDIS_NEGATIVE_SENTINEL};
use entcache_utils::with_timeout;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// Options for a Redis tier
#[derive(Debug, Clone)]
pub struct RedisCacherOptions {
    /// Parts placed before every key built by `make_key`
    pub namespace: Vec<String>,
    pub delimiter: char,
    pub ttl_seconds_positive: u64,
    pub ttl_seconds_negative: u64,
    /// Bound for every round trip
    pub timeout: Duration,
}

impl RedisCacherOptions {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            namespace: vec![config.cache_key_prefix.clone()],
            delimiter: config.key_delimiter,
            ttl_seconds_positive: config.ttl_seconds_positive,
            ttl_seconds_negative: config.ttl_seconds_negative,
            timeout: config.backend_timeout(),
        }
    }
}

impl Default for RedisCacherOptions {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}

/// Generic cacher backed by one Redis instance
pub struct RedisCacher<V: CacheValue> {
    client: Arc<dyn RedisClient>,
    options: RedisCacherOptions,
    key_builder: PartsKeyBuilder,
    name: String,
    _value: PhantomData<fn() -> V>,
}

impl<V: CacheValue> RedisCacher<V> {
    pub fn new(
        name: impl Into<String>,
        client: Arc<dyn RedisClient>,
        options: RedisCacherOptions,
    ) -> Result<Self> {
        if options.ttl_seconds_positive == 0 || options.ttl_seconds_negative == 0 {
            return Err(CacheError::configuration(
                "redis TTLs must be greater than zero",
            ));
        }
        Ok(Self {
            key_builder: PartsKeyBuilder::new(options.delimiter)?,
            client,
            options,
            name: name.into(),
            _value: PhantomData,
        })
    }

    pub fn options(&self) -> &RedisCacherOptions {
        &self.options
    }

    fn decode(&self, key: &str, raw: Option<String>) -> CacheLoadResult<V> {
        match raw {
            None => CacheLoadResult::Miss,
            Some(raw) if raw == REDIS_NEGATIVE_SENTINEL => CacheLoadResult::Negative,
            Some(raw) => match serde_json::from_str(&raw) {
                Ok(value) => CacheLoadResult::Hit(value),
                Err(e) => {
                    let error = CacheError::decode(key, e);
                    tracing::warn!(tier = %self.name, %error, "discarding undecodable cache entry");
                    CacheLoadResult::Miss
                }
            },
        }
    }
}

#[async_trait]
impl<V: CacheValue> GenericCacher<V> for RedisCacher<V> {
    async fn load_many(&self, keys: &[String]) -> Result<HashMap<String, CacheLoadResult<V>>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        let values = with_timeout(
            BackendKind::Redis,
            "mget",
            self.options.timeout,
            self.client.mget(keys),
        )
        .await?;

        if values.len() != keys.len() {
            return Err(CacheError::transient(
                BackendKind::Redis,
                "mget",
                entcache_core::TransientReason::Protocol,
                format!("expected {} values, got {}", keys.len(), values.len()),
            ));
        }

        Ok(keys
            .iter()
            .zip(values)
            .map(|(key, raw)| (key.clone(), self.decode(key, raw)))
            .collect())
    }

    async fn cache_many(&self, entries: &HashMap<String, V>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let encoded = entries
            .iter()
            .map(|(key, value)| {
                serde_json::to_string(value)
                    .map(|json| (key.clone(), json))
                    .map_err(|e| CacheError::encode(key.clone(), e))
            })
            .collect::<Result<Vec<_>>>()?;

        with_timeout(
            BackendKind::Redis,
            "set",
            self.options.timeout,
            self.client
                .set_ex_many(&encoded, self.options.ttl_seconds_positive),
        )
        .await
    }

    async fn cache_misses(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let entries: Vec<(String, String)> = keys
            .iter()
            .map(|key| (key.clone(), REDIS_NEGATIVE_SENTINEL.to_string()))
            .collect();

        with_timeout(
            BackendKind::Redis,
            "set",
            self.options.timeout,
            self.client
                .set_ex_many(&entries, self.options.ttl_seconds_negative),
        )
        .await
    }

    async fn invalidate_many(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        with_timeout(
            BackendKind::Redis,
            "del",
            self.options.timeout,
            self.client.del(keys),
        )
        .await
    }

    fn make_key(&self, parts: &[&str]) -> String {
        let inner = self.key_builder.build(parts);
        self.key_builder.prefixed(&self.options.namespace, &inner)
    }

    fn tier_name(&self) -> &str {
        &self.name
    }
}
