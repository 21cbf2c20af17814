//! Driving a transaction through commit or rollback

use super::callbacks::{CallbackKind, CallbackRecord};
use super::query_context::QueryContext;
use super::scope::TransactionScope;
use async_trait::async_trait;
use entcache_core::Result;
use futures::future::join_all;
use std::future::Future;
use tracing::{debug, error, warn};
use uuid::Uuid;

/// Commit and rollback of one unit of work in the system of record
#[async_trait]
pub trait TransactionHandle: Send {
    async fn commit(&mut self) -> Result<()>;
    async fn rollback(&mut self) -> Result<()>;
}

/// Run `work` inside a transaction
///
/// Pre-commit callbacks run in order before `handle` commits. Once the
/// store has committed, every invalidation callback runs, then every other
/// post-commit callback. If `work`, a pre-commit callback or the commit
/// fails, the transaction is rolled back and nothing queued runs.
///
/// Post-commit failures are logged and do not change the result: the store
/// has already committed.
pub async fn run_in_transaction<H, F, Fut, T>(mut handle: H, work: F) -> Result<T>
where
    H: TransactionHandle,
    F: FnOnce(QueryContext) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let scope = TransactionScope::root();
    let outcome = match work(QueryContext::Transactional(scope.clone())).await {
        Ok(value) => run_pre_commit(&scope).await.map(|()| value),
        Err(error) => Err(error),
    };

    let value = match outcome {
        Ok(value) => value,
        Err(error) => {
            let discarded = scope.abort();
            if let Err(rollback_error) = handle.rollback().await {
                warn!(scope = %scope.id(), error = %rollback_error, "rollback failed");
            }
            debug!(scope = %scope.id(), discarded, "transaction aborted");
            return Err(error);
        }
    };

    if let Err(commit_error) = handle.commit().await {
        let discarded = scope.abort();
        debug!(scope = %scope.id(), discarded, "commit failed, callbacks discarded");
        return Err(commit_error);
    }

    let callbacks = scope.mark_committed()?;
    run_post_commit(scope.id(), callbacks).await;
    Ok(value)
}

/// Drain pre-commit callbacks until none are left, so callbacks queued by
/// a running pre-commit callback still run before the store commits
async fn run_pre_commit(scope: &TransactionScope) -> Result<()> {
    loop {
        let batch = scope.take_pre_commit()?;
        if batch.is_empty() {
            return Ok(());
        }
        for callback in batch {
            callback().await?;
        }
    }
}

async fn run_post_commit(scope: Uuid, callbacks: Vec<CallbackRecord>) {
    let (invalidations, general): (Vec<_>, Vec<_>) = callbacks
        .into_iter()
        .partition(|record| record.kind == CallbackKind::Invalidation);
    debug!(
        %scope,
        invalidations = invalidations.len(),
        callbacks = general.len(),
        "running post-commit callbacks"
    );

    let results = join_all(invalidations.into_iter().map(|record| (record.callback)())).await;
    for failure in results.into_iter().filter_map(|r| r.err()) {
        error!(%scope, error = %failure, "post-commit invalidation failed");
    }

    for record in general {
        if let Err(failure) = (record.callback)().await {
            error!(%scope, error = %failure, "post-commit callback failed");
        }
    }
}
