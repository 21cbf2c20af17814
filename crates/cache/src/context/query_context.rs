//! Query contexts carrying the enclosing transaction, if any

use super::callbacks::{Callback, CallbackKind};
use super::runner::TransactionHandle;
use super::scope::TransactionScope;
use entcache_core::{CacheError, Result, TransactionPhase};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// Where a query runs
///
/// Outside a transaction callbacks run as soon as they are appended. Inside
/// one they are queued on the scope and run, or dropped, when it finishes.
#[derive(Debug, Clone, Default)]
pub enum QueryContext {
    #[default]
    NonTransactional,
    Transactional(Arc<TransactionScope>),
}

impl QueryContext {
    pub fn is_in_transaction(&self) -> bool {
        matches!(self, Self::Transactional(_))
    }

    pub fn scope(&self) -> Option<&Arc<TransactionScope>> {
        match self {
            Self::NonTransactional => None,
            Self::Transactional(scope) => Some(scope),
        }
    }

    /// Phase of the enclosing scope; `None` outside a transaction
    pub fn phase(&self) -> Option<TransactionPhase> {
        self.scope().map(|scope| scope.phase())
    }

    /// Queue a cache invalidation to run right after commit
    pub async fn append_post_commit_invalidation_callback(&self, callback: Callback) -> Result<()> {
        self.append_or_run(CallbackKind::Invalidation, callback).await
    }

    /// Queue work to run after commit, once invalidations are done
    pub async fn append_post_commit_callback(&self, callback: Callback) -> Result<()> {
        self.append_or_run(CallbackKind::PostCommit, callback).await
    }

    /// Queue work to run inside the transaction just before it commits
    ///
    /// Lower `order` runs first. Only valid inside a transaction.
    pub fn append_pre_commit_callback(&self, callback: Callback, order: i32) -> Result<()> {
        match self {
            Self::NonTransactional => Err(CacheError::configuration(
                "pre-commit callbacks require a transactional query context",
            )),
            Self::Transactional(scope) => scope.push(CallbackKind::PreCommit { order }, callback),
        }
    }

    async fn append_or_run(&self, kind: CallbackKind, callback: Callback) -> Result<()> {
        match self {
            Self::NonTransactional => callback().await,
            Self::Transactional(scope) => scope.push(kind, callback),
        }
    }

    /// Run `work` in a scope nested inside this context's transaction
    ///
    /// `handle` controls the nested unit in the store, typically a
    /// savepoint. On success the nested callbacks join the parent queue; on
    /// failure they are dropped and the parent carries on.
    pub async fn run_in_nested_transaction<H, F, Fut, T>(&self, mut handle: H, work: F) -> Result<T>
    where
        H: TransactionHandle,
        F: FnOnce(QueryContext) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let parent = match self {
            Self::NonTransactional => {
                return Err(CacheError::configuration(
                    "nested transactions require an enclosing transaction",
                ))
            }
            Self::Transactional(scope) => scope,
        };
        let child = parent.nested()?;

        match work(QueryContext::Transactional(Arc::clone(&child))).await {
            Ok(value) => {
                if let Err(error) = handle.commit().await {
                    child.abort();
                    return Err(error);
                }
                let promoted = child.promote_into(parent)?;
                debug!(scope = %child.id(), depth = child.depth(), promoted, "nested transaction committed");
                Ok(value)
            }
            Err(error) => {
                let discarded = child.abort();
                if let Err(rollback_error) = handle.rollback().await {
                    warn!(scope = %child.id(), error = %rollback_error, "nested rollback failed");
                }
                debug!(scope = %child.id(), discarded, "nested transaction aborted");
                Err(error)
            }
        }
    }
}
