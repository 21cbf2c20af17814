//! Minimal Redis command surface used by the Redis tier

use async_trait::async_trait;
use entcache_core::{BackendKind, CacheError, Result, TransientReason};
use redis::aio::ConnectionManager;

/// The three commands the Redis tier issues.
///
/// Implemented for [`ConnectionManager`]; anything else speaking the same
/// protocol (a cluster client, a proxy, a test double) can stand in.
#[async_trait]
pub trait RedisClient: Send + Sync {
    /// `MGET` returning one slot per key, `None` for absent keys
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>>;

    /// `SET key value EX ttl` for every entry inside one `MULTI`/`EXEC`
    async fn set_ex_many(&self, entries: &[(String, String)], ttl_seconds: u64) -> Result<()>;

    /// `DEL` every key
    async fn del(&self, keys: &[String]) -> Result<()>;
}

/// Classify a Redis client error as a transient cache failure
pub fn transient_from_redis(operation: &'static str, error: redis::RedisError) -> CacheError {
    let reason = if error.is_timeout() {
        TransientReason::Timeout
    } else if error.is_io_error() || error.is_connection_dropped() || error.is_connection_refusal()
    {
        TransientReason::Connection
    } else {
        TransientReason::Protocol
    };
    CacheError::transient(BackendKind::Redis, operation, reason, error.to_string())
}

/// Open a long-lived, auto-reconnecting connection shared by every request
pub async fn connect(url: &str) -> Result<ConnectionManager> {
    let client = redis::Client::open(url).map_err(|e| {
        CacheError::configuration(format!("invalid redis url '{url}': {e}"))
    })?;
    ConnectionManager::new(client)
        .await
        .map_err(|e| transient_from_redis("connect", e))
}

#[async_trait]
impl RedisClient for ConnectionManager {
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        let mut connection = self.clone();
        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut connection)
            .await
            .map_err(|e| transient_from_redis("mget", e))?;
        Ok(values)
    }

    async fn set_ex_many(&self, entries: &[(String, String)], ttl_seconds: u64) -> Result<()> {
        let mut connection = self.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();
        for (key, value) in entries {
            pipe.cmd("SET")
                .arg(key)
                .arg(value)
                .arg("EX")
                .arg(ttl_seconds)
                .ignore();
        }
        let () = pipe
            .query_async(&mut connection)
            .await
            .map_err(|e| transient_from_redis("set", e))?;
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<()> {
        let mut connection = self.clone();
        let _removed: i64 = redis::cmd("DEL")
            .arg(keys)
            .query_async(&mut connection)
            .await
            .map_err(|e| transient_from_redis("del", e))?;
        Ok(())
    }
}
