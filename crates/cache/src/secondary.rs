//! Caches keyed by an arbitrary parameter object
//!
//! Used to memoize derived lookups that are not a load by a single entity
//! field. The key is `["secondary", constant_key_part, serialized params]`
//! under the cacher's namespace. A fetched `None` is cached as a negative
//! entry.
//!
//! The default serializer is `serde_json`. It is deterministic for structs
//! and ordered maps; parameters holding a `HashMap` need a custom
//! serializer.

use crate::result::CacheLoadResult;
use crate::traits::{CacheValue, GenericCacher};
use entcache_core::{CacheError, Result};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{instrument, warn};

/// Turns a parameter object into the final key part
pub type ParamSerializer<P> = Arc<dyn Fn(&P) -> Result<String> + Send + Sync>;

pub struct SecondaryEntityCache<P, V: CacheValue> {
    cacher: Arc<dyn GenericCacher<V>>,
    constant_key_part: String,
    serializer: ParamSerializer<P>,
}

impl<P, V> SecondaryEntityCache<P, V>
where
    P: Serialize + 'static,
    V: CacheValue,
{
    pub fn new(cacher: Arc<dyn GenericCacher<V>>, constant_key_part: impl Into<String>) -> Self {
        Self::with_serializer(
            cacher,
            constant_key_part,
            Arc::new(|params: &P| {
                serde_json::to_string(params).map_err(|e| CacheError::encode("secondary params", e))
            }),
        )
    }
}

impl<P, V: CacheValue> SecondaryEntityCache<P, V> {
    pub fn with_serializer(
        cacher: Arc<dyn GenericCacher<V>>,
        constant_key_part: impl Into<String>,
        serializer: ParamSerializer<P>,
    ) -> Self {
        Self {
            cacher,
            constant_key_part: constant_key_part.into(),
            serializer,
        }
    }

    pub fn key_for(&self, params: &P) -> Result<String> {
        let serialized = (self.serializer)(params)?;
        Ok(self
            .cacher
            .make_key(&["secondary", self.constant_key_part.as_str(), serialized.as_str()]))
    }

    /// Load each parameter set, computing misses with `fetch`
    ///
    /// Parameters that serialize to the same key are looked up and fetched
    /// once. `fetch` receives each distinct missing parameter set and must
    /// return one result per entry, in the same order. Results are aligned
    /// with `params`.
    #[instrument(skip_all, fields(cache = %self.constant_key_part, params = params.len()))]
    pub async fn load_many_through<F, Fut>(&self, params: &[P], fetch: F) -> Result<Vec<Option<V>>>
    where
        F: FnOnce(Vec<&P>) -> Fut,
        Fut: Future<Output = Result<Vec<Option<V>>>>,
    {
        if params.is_empty() {
            return Ok(Vec::new());
        }

        // slot of each parameter in `keys`, and the first parameter per slot
        let mut slots = Vec::with_capacity(params.len());
        let mut keys: Vec<String> = Vec::new();
        let mut first_seen: Vec<usize> = Vec::new();
        let mut slot_by_key: HashMap<String, usize> = HashMap::new();
        for (index, param) in params.iter().enumerate() {
            let key = self.key_for(param)?;
            let slot = *slot_by_key.entry(key.clone()).or_insert_with(|| {
                keys.push(key);
                first_seen.push(index);
                keys.len() - 1
            });
            slots.push(slot);
        }

        let mut cached = match self.cacher.load_many(&keys).await {
            Ok(cached) => cached,
            Err(error) if error.is_transient() => {
                warn!(%error, "secondary cache unavailable, computing every entry");
                HashMap::new()
            }
            Err(error) => return Err(error),
        };

        let mut resolved: Vec<Option<Option<V>>> = Vec::with_capacity(keys.len());
        let mut missing = Vec::new();
        for (slot, key) in keys.iter().enumerate() {
            match cached.remove(key) {
                Some(CacheLoadResult::Hit(value)) => resolved.push(Some(Some(value))),
                Some(CacheLoadResult::Negative) => resolved.push(Some(None)),
                _ => {
                    resolved.push(None);
                    missing.push(slot);
                }
            }
        }

        if !missing.is_empty() {
            let fetched = fetch(missing.iter().map(|&slot| &params[first_seen[slot]]).collect()).await?;
            if fetched.len() != missing.len() {
                return Err(CacheError::store(
                    "secondary_fetch",
                    format!(
                        "fetcher returned {} results for {} parameters",
                        fetched.len(),
                        missing.len()
                    ),
                ));
            }

            let mut positive = HashMap::new();
            let mut negative = Vec::new();
            for (slot, value) in missing.into_iter().zip(fetched) {
                match &value {
                    Some(v) => {
                        positive.insert(keys[slot].clone(), v.clone());
                    }
                    None => negative.push(keys[slot].clone()),
                }
                resolved[slot] = Some(value);
            }
            self.populate(&positive, &negative).await?;
        }

        Ok(slots
            .into_iter()
            .map(|slot| resolved[slot].clone().flatten())
            .collect())
    }

    pub async fn invalidate_many(&self, params: &[P]) -> Result<()> {
        let keys = params
            .iter()
            .map(|p| self.key_for(p))
            .collect::<Result<Vec<_>>>()?;
        self.cacher.invalidate_many(&keys).await
    }

    async fn populate(&self, positive: &HashMap<String, V>, negative: &[String]) -> Result<()> {
        let outcomes = [
            ("cache_many", self.cacher.cache_many(positive).await),
            ("cache_misses", self.cacher.cache_misses(negative).await),
        ];
        for (operation, outcome) in outcomes {
            if let Err(error) = outcome {
                if error.is_configuration() {
                    return Err(error);
                }
                warn!(operation, %error, "failed to populate secondary cache");
            }
        }
        Ok(())
    }
}
