//! In-memory fakes for exercising cachers without a Redis server
//!
//! Compiled for unit tests and behind the `test-util` feature, which the
//! integration tests and downstream test suites enable.

use crate::backend::redis::RedisClient;
use crate::context::TransactionHandle;
use crate::entity::{EntityFields, RecordFetcher};
use crate::result::CacheLoadResult;
use crate::traits::{CacheValue, GenericCacher};
use async_trait::async_trait;
use entcache_core::{BackendKind, CacheError, Result, TransientReason};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct RedisState {
    values: HashMap<String, (String, u64)>,
    calls: HashMap<&'static str, usize>,
    failure: Option<TransientReason>,
    latency: Option<Duration>,
}

/// Redis stand-in recording values, TTLs and per-command call counts
#[derive(Default)]
pub struct InMemoryRedisClient {
    state: Mutex<RedisState>,
}

impl InMemoryRedisClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored payload for `key`, the negative sentinel included
    pub fn raw(&self, key: &str) -> Option<String> {
        self.state.lock().values.get(key).map(|(v, _)| v.clone())
    }

    pub fn ttl_of(&self, key: &str) -> Option<u64> {
        self.state.lock().values.get(key).map(|(_, ttl)| *ttl)
    }

    /// Store a payload directly, bypassing any cacher
    pub fn insert_raw(&self, key: &str, value: &str) {
        self.state
            .lock()
            .values
            .insert(key.to_string(), (value.to_string(), 0));
    }

    pub fn calls(&self, command: &str) -> usize {
        self.state.lock().calls.get(command).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.state.lock().calls.values().sum()
    }

    pub fn len(&self) -> usize {
        self.state.lock().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fail every following command with a transient error
    pub fn fail_with(&self, reason: TransientReason) {
        self.state.lock().failure = Some(reason);
    }

    pub fn recover(&self) {
        self.state.lock().failure = None;
    }

    /// Delay every following command
    pub fn set_latency(&self, latency: Duration) {
        self.state.lock().latency = Some(latency);
    }

    async fn begin(&self, command: &'static str) -> Result<()> {
        let (failure, latency) = {
            let mut state = self.state.lock();
            *state.calls.entry(command).or_insert(0) += 1;
            (state.failure, state.latency)
        };
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match failure {
            Some(reason) => Err(CacheError::transient(
                BackendKind::Redis,
                command,
                reason,
                "injected failure",
            )),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RedisClient for InMemoryRedisClient {
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>> {
        self.begin("mget").await?;
        let state = self.state.lock();
        Ok(keys
            .iter()
            .map(|key| state.values.get(key).map(|(v, _)| v.clone()))
            .collect())
    }

    async fn set_ex_many(&self, entries: &[(String, String)], ttl_seconds: u64) -> Result<()> {
        self.begin("set").await?;
        let mut state = self.state.lock();
        for (key, value) in entries {
            state
                .values
                .insert(key.clone(), (value.clone(), ttl_seconds));
        }
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<()> {
        self.begin("del").await?;
        let mut state = self.state.lock();
        for key in keys {
            state.values.remove(key);
        }
        Ok(())
    }
}

/// Wraps a cacher, counting calls and optionally failing reads or writes
pub struct CountingCacher<V: CacheValue> {
    inner: Arc<dyn GenericCacher<V>>,
    load_calls: AtomicUsize,
    keys_loaded: AtomicUsize,
    write_calls: AtomicUsize,
    invalidate_calls: AtomicUsize,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    journal: Option<Arc<Mutex<Vec<String>>>>,
}

impl<V: CacheValue> CountingCacher<V> {
    pub fn new<C: GenericCacher<V> + 'static>(inner: Arc<C>) -> Self {
        Self {
            inner,
            load_calls: AtomicUsize::new(0),
            keys_loaded: AtomicUsize::new(0),
            write_calls: AtomicUsize::new(0),
            invalidate_calls: AtomicUsize::new(0),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            journal: None,
        }
    }

    /// Append the tier name to `journal` on every write or invalidation
    pub fn with_journal(mut self, journal: Arc<Mutex<Vec<String>>>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }

    pub fn keys_loaded(&self) -> usize {
        self.keys_loaded.load(Ordering::SeqCst)
    }

    /// `cache_many` and `cache_misses` calls
    pub fn write_calls(&self) -> usize {
        self.write_calls.load(Ordering::SeqCst)
    }

    pub fn invalidate_calls(&self) -> usize {
        self.invalidate_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.load_calls() + self.write_calls() + self.invalidate_calls()
    }

    fn before_write(&self, operation: &'static str, counter: &AtomicUsize) -> Result<()> {
        counter.fetch_add(1, Ordering::SeqCst);
        if let Some(journal) = &self.journal {
            journal.lock().push(self.inner.tier_name().to_string());
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(injected(operation));
        }
        Ok(())
    }
}

fn injected(operation: &'static str) -> CacheError {
    CacheError::transient(
        BackendKind::Custom("test"),
        operation,
        TransientReason::Connection,
        "injected failure",
    )
}

#[async_trait]
impl<V: CacheValue> GenericCacher<V> for CountingCacher<V> {
    async fn load_many(&self, keys: &[String]) -> Result<HashMap<String, CacheLoadResult<V>>> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        self.keys_loaded.fetch_add(keys.len(), Ordering::SeqCst);
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(injected("load_many"));
        }
        self.inner.load_many(keys).await
    }

    async fn cache_many(&self, entries: &HashMap<String, V>) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }
        self.before_write("cache_many", &self.write_calls)?;
        self.inner.cache_many(entries).await
    }

    async fn cache_misses(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        self.before_write("cache_misses", &self.write_calls)?;
        self.inner.cache_misses(keys).await
    }

    async fn invalidate_many(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        self.before_write("invalidate_many", &self.invalidate_calls)?;
        self.inner.invalidate_many(keys).await
    }

    fn make_key(&self, parts: &[&str]) -> String {
        self.inner.make_key(parts)
    }

    fn tier_name(&self) -> &str {
        self.inner.tier_name()
    }
}

/// System of record holding rows in memory
///
/// Column names are looked up as field names through [`EntityFields`].
pub struct InMemoryRecordStore<V> {
    rows: Mutex<Vec<V>>,
    fetch_calls: AtomicUsize,
}

impl<V> Default for InMemoryRecordStore<V> {
    fn default() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            fetch_calls: AtomicUsize::new(0),
        }
    }
}

impl<V: EntityFields + Clone + Send + Sync> InMemoryRecordStore<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `row`, replacing any row with the same `id_field` value
    pub fn upsert(&self, id_field: &str, row: V) {
        let id = row.field_value(id_field);
        let mut rows = self.rows.lock();
        rows.retain(|existing| existing.field_value(id_field) != id);
        rows.push(row);
    }

    pub fn delete(&self, id_field: &str, id: &str) {
        self.rows
            .lock()
            .retain(|row| row.field_value(id_field).as_deref() != Some(id));
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<V: EntityFields + Clone + Send + Sync> RecordFetcher<V> for InMemoryRecordStore<V> {
    async fn fetch_many_by_column(
        &self,
        column: &str,
        values: &[String],
    ) -> Result<HashMap<String, Vec<V>>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let rows = self.rows.lock();
        let mut found: HashMap<String, Vec<V>> = HashMap::new();
        for row in rows.iter() {
            if let Some(value) = row.field_value(column) {
                if values.contains(&value) {
                    found.entry(value).or_default().push(row.clone());
                }
            }
        }
        Ok(found)
    }
}

/// Transaction over an [`InMemoryRecordStore`] whose writes become visible
/// on commit
pub struct StagedTransaction<V> {
    store: Arc<InMemoryRecordStore<V>>,
    id_field: String,
    staged: Arc<Mutex<Vec<V>>>,
}

impl<V: EntityFields + Clone + Send + Sync> StagedTransaction<V> {
    pub fn new(store: Arc<InMemoryRecordStore<V>>, id_field: impl Into<String>) -> Self {
        Self {
            store,
            id_field: id_field.into(),
            staged: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Handle for staging writes while the transaction is open
    pub fn writer(&self) -> Arc<Mutex<Vec<V>>> {
        Arc::clone(&self.staged)
    }
}

#[async_trait]
impl<V: EntityFields + Clone + Send + Sync> TransactionHandle for StagedTransaction<V> {
    async fn commit(&mut self) -> Result<()> {
        for row in self.staged.lock().drain(..) {
            self.store.upsert(&self.id_field, row);
        }
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        self.staged.lock().clear();
        Ok(())
    }
}
