//! Multi-tier cacher
//!
//! Reads walk the tiers nearest first and stop at the first HIT or NEGATIVE
//! for each key. Writes walk the tiers in reverse so the most durable tier
//! is written before any faster tier can reflect it. A failing write does
//! not stop the remaining tiers; the first error is returned once every tier
//! was attempted.
//!
//! A hit in a farther tier is not copied into nearer tiers on read.

use crate::result::CacheLoadResult;
use crate::traits::{CacheValue, GenericCacher};
use async_trait::async_trait;
use entcache_core::{CacheError, Result};
use entcache_utils::tracing::batch_span;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{instrument, trace, warn, Instrument};

pub struct ComposedCacher<V: CacheValue> {
    tiers: Vec<Arc<dyn GenericCacher<V>>>,
    name: String,
}

impl<V: CacheValue> ComposedCacher<V> {
    /// Tiers are ordered nearest to the caller first
    pub fn new(name: impl Into<String>, tiers: Vec<Arc<dyn GenericCacher<V>>>) -> Result<Self> {
        if tiers.is_empty() {
            return Err(CacheError::configuration(
                "a composed cacher needs at least one tier",
            ));
        }
        Ok(Self {
            tiers,
            name: name.into(),
        })
    }

    pub fn tiers(&self) -> &[Arc<dyn GenericCacher<V>>] {
        &self.tiers
    }

    fn record_failure(
        &self,
        first_error: &mut Option<CacheError>,
        tier: &dyn GenericCacher<V>,
        operation: &'static str,
        result: Result<()>,
    ) {
        if let Err(error) = result {
            warn!(tier = %tier.tier_name(), operation, %error, "tier write failed");
            first_error.get_or_insert(error);
        }
    }
}

#[async_trait]
impl<V: CacheValue> GenericCacher<V> for ComposedCacher<V> {
    #[instrument(skip_all, fields(tier = %self.name, keys = keys.len()))]
    async fn load_many(&self, keys: &[String]) -> Result<HashMap<String, CacheLoadResult<V>>> {
        let mut seen = HashSet::with_capacity(keys.len());
        let mut pending: Vec<String> = keys
            .iter()
            .filter(|key| seen.insert(key.as_str()))
            .cloned()
            .collect();
        let mut resolved = HashMap::with_capacity(pending.len());

        for tier in &self.tiers {
            if pending.is_empty() {
                break;
            }
            let mut results = tier
                .load_many(&pending)
                .instrument(batch_span("load_many", tier.tier_name(), pending.len()))
                .await?;
            pending.retain(|key| match results.remove(key) {
                Some(result) if result.is_resolved() => {
                    resolved.insert(key.clone(), result);
                    false
                }
                _ => true,
            });
            trace!(tier = %tier.tier_name(), unresolved = pending.len(), "tier consulted");
        }

        for key in pending {
            resolved.insert(key, CacheLoadResult::Miss);
        }
        Ok(resolved)
    }

    #[instrument(skip_all, fields(tier = %self.name, keys = entries.len()))]
    async fn cache_many(&self, entries: &HashMap<String, V>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut first_error = None;
        for tier in self.tiers.iter().rev() {
            let result = tier
                .cache_many(entries)
                .instrument(batch_span("cache_many", tier.tier_name(), entries.len()))
                .await;
            self.record_failure(&mut first_error, tier.as_ref(), "cache_many", result);
        }
        first_error.map_or(Ok(()), Err)
    }

    #[instrument(skip_all, fields(tier = %self.name, keys = keys.len()))]
    async fn cache_misses(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut first_error = None;
        for tier in self.tiers.iter().rev() {
            let result = tier
                .cache_misses(keys)
                .instrument(batch_span("cache_misses", tier.tier_name(), keys.len()))
                .await;
            self.record_failure(&mut first_error, tier.as_ref(), "cache_misses", result);
        }
        first_error.map_or(Ok(()), Err)
    }

    #[instrument(skip_all, fields(tier = %self.name, keys = keys.len()))]
    async fn invalidate_many(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut first_error = None;
        for tier in self.tiers.iter().rev() {
            let result = tier
                .invalidate_many(keys)
                .instrument(batch_span("invalidate_many", tier.tier_name(), keys.len()))
                .await;
            self.record_failure(&mut first_error, tier.as_ref(), "invalidate_many", result);
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Every tier stores the key built by the most durable tier
    fn make_key(&self, parts: &[&str]) -> String {
        match self.tiers.last() {
            Some(tier) => tier.make_key(parts),
            None => String::new(),
        }
    }

    fn tier_name(&self) -> &str {
        &self.name
    }
}
