//! Read-through loading of entities by field
//!
//! Cached results are served first. Misses go to the [`RecordFetcher`] and
//! are written back: exactly one row is cached as a positive entry, zero
//! rows as a negative entry, and several rows are not cached because the
//! field is not unique for those values. When the cache is unavailable the
//! whole batch is read from the fetcher.

use super::adapter::EntityCacheAdapter;
use crate::metrics::{CacheMetrics, NoopCacheMetrics};
use crate::result::{CacheLoadResult, CacheStatus};
use crate::traits::CacheValue;
use async_trait::async_trait;
use entcache_core::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// The system of record
#[async_trait]
pub trait RecordFetcher<V>: Send + Sync {
    /// Rows whose `column` equals each value
    ///
    /// Values without rows may be omitted from the result.
    async fn fetch_many_by_column(
        &self,
        column: &str,
        values: &[String],
    ) -> Result<HashMap<String, Vec<V>>>;
}

pub struct ReadThroughEntityCache<V: CacheValue> {
    adapter: Arc<EntityCacheAdapter<V>>,
    fetcher: Arc<dyn RecordFetcher<V>>,
    metrics: Arc<dyn CacheMetrics>,
}

impl<V: CacheValue> ReadThroughEntityCache<V> {
    pub fn new(adapter: Arc<EntityCacheAdapter<V>>, fetcher: Arc<dyn RecordFetcher<V>>) -> Self {
        Self {
            adapter,
            fetcher,
            metrics: Arc::new(NoopCacheMetrics),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn CacheMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn adapter(&self) -> &Arc<EntityCacheAdapter<V>> {
        &self.adapter
    }

    /// Load every row matching each value of `field`
    ///
    /// Every distinct input value appears in the result, with an empty
    /// list when no row matches.
    #[instrument(skip_all, fields(table = %self.adapter.configuration().table_name, field = %field, values = values.len()))]
    pub async fn load_many_by_field(
        &self,
        field: &str,
        values: &[String],
    ) -> Result<HashMap<String, Vec<V>>> {
        let configuration = self.adapter.configuration();
        let column = configuration.column_for(field)?;
        if values.is_empty() {
            return Ok(HashMap::new());
        }
        if !configuration.is_cacheable(field) {
            return self.fetch(column, values).await;
        }

        let cached = match self.adapter.load_many(field, values).await {
            Ok(cached) => cached,
            Err(error) if error.is_transient() => {
                warn!(%error, "cache unavailable, reading from the system of record");
                self.metrics.record_error("load_many", &error);
                return self.fetch(column, values).await;
            }
            Err(error) => return Err(error),
        };

        let mut results = HashMap::with_capacity(cached.len());
        let mut misses = Vec::new();
        let (mut hits, mut negatives) = (0, 0);
        for (value, result) in cached {
            match result {
                CacheLoadResult::Hit(row) => {
                    hits += 1;
                    results.insert(value, vec![row]);
                }
                CacheLoadResult::Negative => {
                    negatives += 1;
                    results.insert(value, Vec::new());
                }
                CacheLoadResult::Miss => misses.push(value),
            }
        }
        let tier = self.adapter.tier_name();
        self.metrics.record_load(tier, CacheStatus::Hit, hits);
        self.metrics.record_load(tier, CacheStatus::Negative, negatives);
        self.metrics
            .record_load(tier, CacheStatus::Miss, misses.len() as u64);

        if misses.is_empty() {
            return Ok(results);
        }

        let mut fetched = self.fetch(column, &misses).await?;
        let mut positive = HashMap::new();
        let mut negative = Vec::new();
        for value in misses {
            let rows = fetched.remove(&value).unwrap_or_default();
            match rows.as_slice() {
                [] => negative.push(value.clone()),
                [row] => {
                    positive.insert(value.clone(), row.clone());
                }
                _ => debug!(value = %value, rows = rows.len(), "multiple rows, not caching"),
            }
            results.insert(value, rows);
        }

        self.populate(field, &positive, &negative).await?;
        Ok(results)
    }

    /// Load rows for a single value
    pub async fn load_by_field(&self, field: &str, value: &str) -> Result<Vec<V>> {
        let value = value.to_string();
        let mut loaded = self
            .load_many_by_field(field, std::slice::from_ref(&value))
            .await?;
        Ok(loaded.remove(&value).unwrap_or_default())
    }

    async fn fetch(&self, column: &str, values: &[String]) -> Result<HashMap<String, Vec<V>>> {
        let mut seen = std::collections::HashSet::with_capacity(values.len());
        let unique: Vec<String> = values
            .iter()
            .filter(|value| seen.insert(value.as_str()))
            .cloned()
            .collect();
        self.metrics
            .record_fetch(&self.adapter.configuration().table_name, unique.len() as u64);

        let mut fetched = self.fetcher.fetch_many_by_column(column, &unique).await?;
        Ok(unique
            .into_iter()
            .map(|value| {
                let rows = fetched.remove(&value).unwrap_or_default();
                (value, rows)
            })
            .collect())
    }

    /// Write fetched results back; only configuration errors fail the load
    async fn populate(
        &self,
        field: &str,
        positive: &HashMap<String, V>,
        negative: &[String],
    ) -> Result<()> {
        let outcomes = [
            ("cache_many", self.adapter.cache_many(field, positive).await),
            ("cache_misses", self.adapter.cache_misses(field, negative).await),
        ];
        for (operation, outcome) in outcomes {
            if let Err(error) = outcome {
                if error.is_configuration() {
                    return Err(error);
                }
                warn!(operation, %error, "failed to populate cache");
                self.metrics.record_error(operation, &error);
            }
        }
        Ok(())
    }
}
