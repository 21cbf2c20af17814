//! End-to-end behaviour of single tiers through the generic cacher contract

use entcache_cache::testing::InMemoryRedisClient;
use entcache_cache::{
    CacheConfig, CacheLoadResult, CacheStatus, GenericCacher, LocalMemoryCacher,
    LocalMemoryOptions, PartsKeyBuilder, RedisCacher, RedisCacherOptions,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct User {
    id: String,
    email: String,
}

fn alice() -> User {
    User {
        id: "1".to_string(),
        email: "a@b.com".to_string(),
    }
}

fn app_config() -> CacheConfig {
    entcache_utils::tracing::init_for_tests();
    CacheConfig {
        cache_key_prefix: "app".to_string(),
        ..CacheConfig::default()
    }
}

#[test]
fn parts_build_the_documented_key() {
    let key = PartsKeyBuilder::default().build(&["app", "users", "v1", "email", "a@b.com"]);
    assert_eq!(key, "app:users:v1:email:a@b.com");
}

#[tokio::test]
async fn redis_hit_then_invalidate_then_miss() {
    let client = Arc::new(InMemoryRedisClient::new());
    let cacher: RedisCacher<User> = RedisCacher::new(
        "redis",
        client.clone(),
        RedisCacherOptions::from_config(&app_config()),
    )
    .unwrap();

    let key = cacher.make_key(&["users", "v1", "email", "a@b.com"]);
    assert_eq!(key, "app:users:v1:email:a@b.com");

    cacher
        .cache_many(&HashMap::from([(key.clone(), alice())]))
        .await
        .unwrap();
    assert_eq!(client.ttl_of(&key), Some(86_400));

    let loaded = cacher.load_many(&[key.clone()]).await.unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[&key].status(), CacheStatus::Hit);
    assert_eq!(loaded[&key].item(), Some(&alice()));

    cacher.invalidate_many(&[key.clone()]).await.unwrap();
    let loaded = cacher.load_many(&[key.clone()]).await.unwrap();
    assert_eq!(loaded[&key], CacheLoadResult::Miss);
}

#[tokio::test]
async fn local_hit_then_invalidate_then_miss() {
    let cacher: LocalMemoryCacher<User> =
        LocalMemoryCacher::new("local", LocalMemoryOptions::from_config(&app_config())).unwrap();
    let key = cacher.make_key(&["users", "v1", "email", "a@b.com"]);
    assert_eq!(key, "app:users:v1:email:a@b.com");

    cacher
        .cache_many(&HashMap::from([(key.clone(), alice())]))
        .await
        .unwrap();
    let loaded = cacher.load_many(&[key.clone()]).await.unwrap();
    assert_eq!(loaded[&key], CacheLoadResult::Hit(alice()));

    cacher.invalidate_many(&[key.clone()]).await.unwrap();
    let loaded = cacher.load_many(&[key.clone()]).await.unwrap();
    assert_eq!(loaded[&key], CacheLoadResult::Miss);
}

#[tokio::test]
async fn repeated_misses_yield_one_negative() {
    let client = Arc::new(InMemoryRedisClient::new());
    let cacher: RedisCacher<User> =
        RedisCacher::new("redis", client.clone(), RedisCacherOptions::default()).unwrap();
    let key = cacher.make_key(&["users", "v1", "id", "404"]);

    cacher.cache_misses(&[key.clone()]).await.unwrap();
    cacher.cache_misses(&[key.clone()]).await.unwrap();

    let loaded = cacher.load_many(&[key.clone()]).await.unwrap();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[&key], CacheLoadResult::Negative);
    assert_eq!(client.len(), 1);
}

#[tokio::test]
async fn invalidating_absent_keys_succeeds() {
    let client = Arc::new(InMemoryRedisClient::new());
    let cacher: RedisCacher<User> =
        RedisCacher::new("redis", client, RedisCacherOptions::default()).unwrap();
    cacher
        .invalidate_many(&["never-written".to_string()])
        .await
        .unwrap();
}

#[tokio::test(start_paused = true)]
async fn negative_entry_expires_before_positive() {
    let config = CacheConfig {
        ttl_seconds_positive: 86_400,
        ttl_seconds_negative: 600,
        ..CacheConfig::default()
    };
    let cacher: LocalMemoryCacher<User> =
        LocalMemoryCacher::new("local", LocalMemoryOptions::from_config(&config)).unwrap();
    let positive = "users:id:1".to_string();
    let negative = "users:id:2".to_string();

    cacher
        .cache_many(&HashMap::from([(positive.clone(), alice())]))
        .await
        .unwrap();
    cacher.cache_misses(&[negative.clone()]).await.unwrap();

    tokio::time::advance(Duration::from_secs(601)).await;
    let loaded = cacher
        .load_many(&[positive.clone(), negative.clone()])
        .await
        .unwrap();
    assert_eq!(loaded[&positive].status(), CacheStatus::Hit);
    assert_eq!(loaded[&negative].status(), CacheStatus::Miss);

    tokio::time::advance(Duration::from_secs(86_400)).await;
    let loaded = cacher.load_many(&[positive.clone()]).await.unwrap();
    assert_eq!(loaded[&positive].status(), CacheStatus::Miss);
}
