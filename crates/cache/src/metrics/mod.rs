//! Cache metrics
//!
//! Loaders report through the [`CacheMetrics`] trait so the Prometheus
//! dependency stays optional at the call site.

mod prometheus_metrics;

pub use prometheus_metrics::PrometheusCacheMetrics;

use crate::result::CacheStatus;
use entcache_core::CacheError;

pub trait CacheMetrics: Send + Sync {
    /// `count` keys resolved with `status` by `tier`
    fn record_load(&self, tier: &str, status: CacheStatus, count: u64);

    /// A cache operation failed
    fn record_error(&self, operation: &'static str, error: &CacheError);

    /// Values fetched from the system of record for `table`
    fn record_fetch(&self, table: &str, count: u64);
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCacheMetrics;

impl CacheMetrics for NoopCacheMetrics {
    fn record_load(&self, _tier: &str, _status: CacheStatus, _count: u64) {}

    fn record_error(&self, _operation: &'static str, _error: &CacheError) {}

    fn record_fetch(&self, _table: &str, _count: u64) {}
}

/// Label used for the error kind
pub(crate) fn error_kind(error: &CacheError) -> &'static str {
    match error {
        CacheError::Transient { .. } => "transient",
        CacheError::Configuration { .. } | CacheError::TransactionState { .. } => "configuration",
        CacheError::Serialization { .. } => "serialization",
        CacheError::Store { .. } => "store",
    }
}
