//! Prometheus counters for cache loads

use super::{error_kind, CacheMetrics};
use crate::result::CacheStatus;
use entcache_core::{CacheError, Result};
use prometheus::{CounterVec, Opts, Registry};

pub struct PrometheusCacheMetrics {
    /// Loads by tier and status
    loads: CounterVec,
    /// Failures by operation and error kind
    errors: CounterVec,
    /// Values read from the system of record
    fetches: CounterVec,
}

impl PrometheusCacheMetrics {
    /// Create the counters and register them with `registry`
    pub fn init(registry: &Registry) -> Result<Self> {
        let loads = CounterVec::new(
            Opts::new(
                "entcache_loads_total",
                "Keys resolved by cache loads, by tier and status",
            ),
            &["tier", "status"],
        )
        .map_err(registration_error)?;
        registry
            .register(Box::new(loads.clone()))
            .map_err(registration_error)?;

        let errors = CounterVec::new(
            Opts::new("entcache_errors_total", "Failed cache operations"),
            &["operation", "kind"],
        )
        .map_err(registration_error)?;
        registry
            .register(Box::new(errors.clone()))
            .map_err(registration_error)?;

        let fetches = CounterVec::new(
            Opts::new(
                "entcache_fetches_total",
                "Values fetched from the system of record after a cache miss",
            ),
            &["table"],
        )
        .map_err(registration_error)?;
        registry
            .register(Box::new(fetches.clone()))
            .map_err(registration_error)?;

        Ok(Self {
            loads,
            errors,
            fetches,
        })
    }

    pub fn loads(&self, tier: &str, status: CacheStatus) -> f64 {
        self.loads
            .with_label_values(&[tier, status_label(status)])
            .get()
    }

    pub fn errors(&self, operation: &str, kind: &str) -> f64 {
        self.errors.with_label_values(&[operation, kind]).get()
    }

    pub fn fetches(&self, table: &str) -> f64 {
        self.fetches.with_label_values(&[table]).get()
    }
}

fn registration_error(error: prometheus::Error) -> CacheError {
    CacheError::configuration(format!("failed to register cache metrics: {error}"))
}

fn status_label(status: CacheStatus) -> &'static str {
    match status {
        CacheStatus::Hit => "hit",
        CacheStatus::Miss => "miss",
        CacheStatus::Negative => "negative",
    }
}

impl CacheMetrics for PrometheusCacheMetrics {
    fn record_load(&self, tier: &str, status: CacheStatus, count: u64) {
        if count > 0 {
            self.loads
                .with_label_values(&[tier, status_label(status)])
                .inc_by(count as f64);
        }
    }

    fn record_error(&self, operation: &'static str, error: &CacheError) {
        self.errors
            .with_label_values(&[operation, error_kind(error)])
            .inc();
    }

    fn record_fetch(&self, table: &str, count: u64) {
        if count > 0 {
            self.fetches
                .with_label_values(&[table])
                .inc_by(count as f64);
        }
    }
}
