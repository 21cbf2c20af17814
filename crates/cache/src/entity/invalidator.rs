//! Invalidation of cached entities after writes

use super::adapter::EntityCacheAdapter;
use super::EntityFields;
use crate::context::{callback, QueryContext};
use crate::traits::CacheValue;
use entcache_core::Result;
use entcache_utils::{retry, RetryConfig};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

/// Cacheable field values per field
pub type FieldValues = BTreeMap<String, BTreeSet<String>>;

/// Queues invalidation of every cache key a write may have made stale
pub struct EntityCacheInvalidator<V: CacheValue> {
    adapter: Arc<EntityCacheAdapter<V>>,
    retry: RetryConfig,
}

impl<V: CacheValue> EntityCacheInvalidator<V> {
    pub fn new(adapter: Arc<EntityCacheAdapter<V>>) -> Self {
        Self {
            adapter,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Cacheable values held by the entity before and after a write
    ///
    /// Both sides are needed: an update that changes a unique field leaves
    /// the old value's entry stale as well as the new one's.
    pub fn stale_values<E: EntityFields>(&self, before: Option<&E>, after: Option<&E>) -> FieldValues {
        let mut values = FieldValues::new();
        for field in self.adapter.configuration().cacheable_fields() {
            let found: BTreeSet<String> = [before, after]
                .into_iter()
                .flatten()
                .filter_map(|entity| entity.field_value(field))
                .collect();
            if !found.is_empty() {
                values.insert(field.to_string(), found);
            }
        }
        values
    }

    /// Invalidate after the write in `context` commits, or right away
    /// outside a transaction
    pub async fn on_mutation<E: EntityFields>(
        &self,
        context: &QueryContext,
        before: Option<&E>,
        after: Option<&E>,
    ) -> Result<()> {
        let values = self.stale_values(before, after);
        if values.is_empty() {
            return Ok(());
        }
        debug!(
            table = %self.adapter.configuration().table_name,
            fields = values.len(),
            deferred = context.is_in_transaction(),
            "queueing cache invalidation"
        );

        let adapter = Arc::clone(&self.adapter);
        let policy = self.retry.clone();
        context
            .append_post_commit_invalidation_callback(callback(move || async move {
                retry(&policy, || adapter.invalidate_fields(&values)).await
            }))
            .await
    }

    /// Invalidate immediately, ignoring any transaction
    pub async fn invalidate_entity<E: EntityFields>(&self, entity: &E) -> Result<()> {
        let values = self.stale_values(Some(entity), None);
        if values.is_empty() {
            return Ok(());
        }
        retry(&self.retry, || self.adapter.invalidate_fields(&values)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{LocalMemoryCacher, LocalMemoryOptions};
    use crate::entity::EntityConfiguration;
    use crate::testing::CountingCacher;
    use crate::traits::GenericCacher;
    use entcache_core::InvalidationStrategy;
    use std::collections::HashMap;
    use std::time::Duration;

    type Row = BTreeMap<String, String>;

    fn row(id: &str, email: &str) -> Row {
        BTreeMap::from([
            ("id".to_string(), id.to_string()),
            ("email".to_string(), email.to_string()),
        ])
    }

    fn invalidator(tier: &Arc<CountingCacher<Row>>) -> EntityCacheInvalidator<Row> {
        let configuration = EntityConfiguration::new("users", 1)
            .with_cacheable_field("id", "id")
            .with_cacheable_field("email", "email")
            .with_field("name", "name");
        let adapter = EntityCacheAdapter::new(
            Arc::new(configuration),
            Arc::clone(tier) as Arc<dyn GenericCacher<Row>>,
            InvalidationStrategy::CurrentVersion,
        )
        .unwrap();
        EntityCacheInvalidator::new(Arc::new(adapter)).with_retry(RetryConfig {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            jitter_factor: 0.0,
            ..RetryConfig::default()
        })
    }

    fn tier() -> Arc<CountingCacher<Row>> {
        let local: Arc<LocalMemoryCacher<Row>> =
            Arc::new(LocalMemoryCacher::new("local", LocalMemoryOptions::default()).unwrap());
        Arc::new(CountingCacher::new(local))
    }

    #[test]
    fn update_covers_old_and_new_values() {
        let invalidator = invalidator(&tier());
        let before = row("1", "old@b.com");
        let after = row("1", "new@b.com");

        let values = invalidator.stale_values(Some(&before), Some(&after));
        assert_eq!(values["id"].len(), 1);
        assert_eq!(
            values["email"].iter().collect::<Vec<_>>(),
            vec!["new@b.com", "old@b.com"]
        );
        assert!(!values.contains_key("name"));
    }

    #[tokio::test]
    async fn outside_a_transaction_invalidates_immediately() {
        let tier = tier();
        let invalidator = invalidator(&tier);
        let entity = row("1", "a@b.com");
        let key = invalidator.adapter.key_for("id", "1").unwrap();
        tier.cache_many(&HashMap::from([(key.clone(), entity.clone())]))
            .await
            .unwrap();

        invalidator
            .on_mutation(&QueryContext::NonTransactional, Some(&entity), None)
            .await
            .unwrap();

        assert_eq!(tier.invalidate_calls(), 1);
        let loaded = tier.load_many(&[key.clone()]).await.unwrap();
        assert!(!loaded[&key].is_resolved());
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let tier = tier();
        let invalidator = invalidator(&tier);
        tier.fail_writes(true);

        let error = invalidator
            .invalidate_entity(&row("1", "a@b.com"))
            .await
            .unwrap_err();
        assert!(error.is_transient());
        assert_eq!(tier.invalidate_calls(), 3);
    }
}
