//! Shard assignment functions

use async_trait::async_trait;
use entcache_core::{CacheError, Result};
use std::collections::HashMap;
use std::hash::Hash;
use std::marker::PhantomData;
use xxhash_rust::xxh3::xxh3_64;

/// Shard group identifier
pub trait ShardGroup: Clone + Eq + Hash + std::fmt::Debug + Send + Sync + 'static {}

impl<T> ShardGroup for T where T: Clone + Eq + Hash + std::fmt::Debug + Send + Sync + 'static {}

/// Maps a batch of keys to shard groups in a single call
///
/// A key missing from the returned map is a configuration error in the
/// caller.
#[async_trait]
pub trait ShardAssignment<G: ShardGroup>: Send + Sync {
    async fn assign(&self, keys: &[String]) -> Result<HashMap<String, G>>;
}

/// Assigns keys to `0..shards` by xxh3 hash
#[derive(Debug, Clone, Copy)]
pub struct ModuloShardAssignment {
    shards: u64,
}

impl ModuloShardAssignment {
    pub fn new(shards: usize) -> Result<Self> {
        if shards == 0 {
            return Err(CacheError::configuration("shard count must be at least 1"));
        }
        Ok(Self {
            shards: shards as u64,
        })
    }

    pub fn shard_for(&self, key: &str) -> usize {
        (xxh3_64(key.as_bytes()) % self.shards) as usize
    }
}

#[async_trait]
impl ShardAssignment<usize> for ModuloShardAssignment {
    async fn assign(&self, keys: &[String]) -> Result<HashMap<String, usize>> {
        Ok(keys
            .iter()
            .map(|key| (key.clone(), self.shard_for(key)))
            .collect())
    }
}

/// Adapts a per-key function; keys for which it returns `None` stay
/// unassigned
pub struct FnShardAssignment<G, F> {
    assign: F,
    _group: PhantomData<fn() -> G>,
}

impl<G, F> FnShardAssignment<G, F>
where
    G: ShardGroup,
    F: Fn(&str) -> Option<G> + Send + Sync,
{
    pub fn new(assign: F) -> Self {
        Self {
            assign,
            _group: PhantomData,
        }
    }
}

#[async_trait]
impl<G, F> ShardAssignment<G> for FnShardAssignment<G, F>
where
    G: ShardGroup,
    F: Fn(&str) -> Option<G> + Send + Sync,
{
    async fn assign(&self, keys: &[String]) -> Result<HashMap<String, G>> {
        Ok(keys
            .iter()
            .filter_map(|key| (self.assign)(key).map(|group| (key.clone(), group)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn modulo_is_stable_and_bounded() {
        let assignment = ModuloShardAssignment::new(4).unwrap();
        let keys: Vec<String> = (0..200).map(|i| format!("app:1:users:v1:id:{i}")).collect();
        let first = assignment.assign(&keys).await.unwrap();
        let second = assignment.assign(&keys).await.unwrap();

        assert_eq!(first, second);
        assert!(first.values().all(|shard| *shard < 4));
        let used: std::collections::HashSet<_> = first.values().collect();
        assert_eq!(used.len(), 4);
    }

    #[test]
    fn zero_shards_rejected() {
        assert!(ModuloShardAssignment::new(0).unwrap_err().is_configuration());
    }

    #[tokio::test]
    async fn fn_assignment_skips_unassigned() {
        let assignment = FnShardAssignment::new(|key: &str| {
            key.strip_prefix("tenant-").map(|rest| rest.to_string())
        });
        let keys = vec!["tenant-a".to_string(), "orphan".to_string()];
        let assigned = assignment.assign(&keys).await.unwrap();
        assert_eq!(assigned.len(), 1);
        assert_eq!(assigned["tenant-a"], "a");
    }
}
