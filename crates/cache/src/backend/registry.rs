//! Per-table registry of in-process tiers
//!
//! One registry is constructed per process and passed explicitly to whatever
//! builds entity caches, so every loader for a table shares the same bounded
//! store.

use super::local_memory::{LocalMemoryCacher, LocalMemoryOptions};
use crate::traits::CacheValue;
use dashmap::DashMap;
use entcache_core::Result;
use std::sync::Arc;

/// Hands out one [`LocalMemoryCacher`] per table name
pub struct LocalMemoryCacheRegistry<V: CacheValue> {
    caches: DashMap<String, Arc<LocalMemoryCacher<V>>>,
    options: LocalMemoryOptions,
}

impl<V: CacheValue> LocalMemoryCacheRegistry<V> {
    pub fn new(options: LocalMemoryOptions) -> Self {
        Self {
            caches: DashMap::new(),
            options,
        }
    }

    /// Return the tier for `table_name`, creating it on first use
    pub fn get_or_create(&self, table_name: &str) -> Result<Arc<LocalMemoryCacher<V>>> {
        if let Some(existing) = self.caches.get(table_name) {
            return Ok(Arc::clone(existing.value()));
        }
        let cacher = Arc::new(LocalMemoryCacher::new(
            format!("local:{table_name}"),
            self.options.clone(),
        )?);
        let entry = self
            .caches
            .entry(table_name.to_string())
            .or_insert(cacher);
        Ok(Arc::clone(entry.value()))
    }

    pub fn len(&self) -> usize {
        self.caches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }

    /// Drop every entry in every table's tier
    pub fn clear_all(&self) {
        for cache in self.caches.iter() {
            cache.value().clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::GenericCacher;
    use std::collections::HashMap;

    #[tokio::test]
    async fn same_table_shares_one_tier() {
        let registry: LocalMemoryCacheRegistry<String> =
            LocalMemoryCacheRegistry::new(LocalMemoryOptions::default());
        let first = registry.get_or_create("users").unwrap();
        let second = registry.get_or_create("users").unwrap();
        let other = registry.get_or_create("posts").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &other));
        assert_eq!(registry.len(), 2);

        first
            .cache_many(&HashMap::from([("k".to_string(), "v".to_string())]))
            .await
            .unwrap();
        assert_eq!(second.len(), 1);

        registry.clear_all();
        assert!(second.is_empty());
    }
}
