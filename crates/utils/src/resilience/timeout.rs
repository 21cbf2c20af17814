//! Deadline enforcement for backend calls

use entcache_core::{BackendKind, CacheError, Result};
use std::future::Future;
use std::time::Duration;

/// Run `operation`, failing with a transient timeout error once `limit` elapses.
///
/// The inner future is dropped on timeout, so a stalled backend call never
/// completes behind the caller's back.
pub async fn with_timeout<F, T>(
    backend: BackendKind,
    operation: &'static str,
    limit: Duration,
    future: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(%backend, operation, ?limit, "backend call timed out");
            Err(CacheError::timeout(backend, operation, limit))
        }
    }
}
