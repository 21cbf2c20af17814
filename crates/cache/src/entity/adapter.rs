//! Field-level view of a generic cacher for one entity type
//!
//! Keys are `[table, v{cache_key_version}, column, value]` passed through
//! the cacher's own `make_key`, so the cacher's namespace (prefix, sharding
//! scheme version) is always in front.

use super::configuration::EntityConfiguration;
use crate::result::CacheLoadResult;
use crate::traits::{CacheValue, GenericCacher};
use entcache_core::{CacheError, InvalidationStrategy, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

pub struct EntityCacheAdapter<V: CacheValue> {
    configuration: Arc<EntityConfiguration>,
    cacher: Arc<dyn GenericCacher<V>>,
    strategy: InvalidationStrategy,
}

impl<V: CacheValue> EntityCacheAdapter<V> {
    pub fn new(
        configuration: Arc<EntityConfiguration>,
        cacher: Arc<dyn GenericCacher<V>>,
        strategy: InvalidationStrategy,
    ) -> Result<Self> {
        configuration.validate()?;
        Ok(Self {
            configuration,
            cacher,
            strategy,
        })
    }

    pub fn configuration(&self) -> &EntityConfiguration {
        &self.configuration
    }

    pub fn tier_name(&self) -> &str {
        self.cacher.tier_name()
    }

    fn cacheable_column(&self, field: &str) -> Result<&str> {
        let column = self.configuration.column_for(field)?;
        if !self.configuration.is_cacheable(field) {
            return Err(CacheError::configuration(format!(
                "field '{field}' on table '{}' is not cacheable",
                self.configuration.table_name
            )));
        }
        Ok(column)
    }

    fn key(&self, column: &str, value: &str, version: u32) -> String {
        let version = format!("v{version}");
        self.cacher.make_key(&[
            self.configuration.table_name.as_str(),
            version.as_str(),
            column,
            value,
        ])
    }

    /// Key for `field = value` under the current schema cache version
    pub fn key_for(&self, field: &str, value: &str) -> Result<String> {
        let column = self.cacheable_column(field)?;
        Ok(self.key(column, value, self.configuration.cache_key_version))
    }

    fn versions_to_invalidate(&self) -> Vec<u32> {
        let current = self.configuration.cache_key_version;
        match self.strategy {
            InvalidationStrategy::CurrentVersion => vec![current],
            InvalidationStrategy::SurroundingVersions => current
                .checked_sub(1)
                .into_iter()
                .chain(Some(current))
                .chain(current.checked_add(1))
                .collect(),
        }
    }

    /// Every key to remove for the given values of `field`
    pub fn invalidation_keys(&self, field: &str, values: &[String]) -> Result<Vec<String>> {
        let column = self.cacheable_column(field)?;
        let versions = self.versions_to_invalidate();
        Ok(values
            .iter()
            .flat_map(|value| {
                versions
                    .iter()
                    .map(move |version| self.key(column, value, *version))
            })
            .collect())
    }

    /// Load by field value; the result is keyed by value
    pub async fn load_many(
        &self,
        field: &str,
        values: &[String],
    ) -> Result<HashMap<String, CacheLoadResult<V>>> {
        let column = self.cacheable_column(field)?;
        let version = self.configuration.cache_key_version;
        let keyed: HashMap<String, &String> = values
            .iter()
            .map(|value| (self.key(column, value, version), value))
            .collect();
        if keyed.is_empty() {
            return Ok(HashMap::new());
        }

        let keys: Vec<String> = keyed.keys().cloned().collect();
        let mut loaded = self.cacher.load_many(&keys).await?;
        Ok(keyed
            .into_iter()
            .map(|(key, value)| {
                let result = loaded.remove(&key).unwrap_or(CacheLoadResult::Miss);
                (value.clone(), result)
            })
            .collect())
    }

    /// Cache one row per field value
    pub async fn cache_many(&self, field: &str, rows: &HashMap<String, V>) -> Result<()> {
        let column = self.cacheable_column(field)?;
        let version = self.configuration.cache_key_version;
        let entries: HashMap<String, V> = rows
            .iter()
            .map(|(value, row)| (self.key(column, value, version), row.clone()))
            .collect();
        self.cacher.cache_many(&entries).await
    }

    /// Record that no row exists for each value
    pub async fn cache_misses(&self, field: &str, values: &[String]) -> Result<()> {
        let column = self.cacheable_column(field)?;
        let version = self.configuration.cache_key_version;
        let keys: Vec<String> = values
            .iter()
            .map(|value| self.key(column, value, version))
            .collect();
        self.cacher.cache_misses(&keys).await
    }

    pub async fn invalidate_many(&self, field: &str, values: &[String]) -> Result<()> {
        let keys = self.invalidation_keys(field, values)?;
        self.cacher.invalidate_many(&keys).await
    }

    /// Invalidate several fields in a single cacher call
    pub async fn invalidate_fields(&self, values: &BTreeMap<String, BTreeSet<String>>) -> Result<()> {
        let mut keys = Vec::new();
        for (field, field_values) in values {
            let field_values: Vec<String> = field_values.iter().cloned().collect();
            keys.extend(self.invalidation_keys(field, &field_values)?);
        }
        self.cacher.invalidate_many(&keys).await
    }
}
