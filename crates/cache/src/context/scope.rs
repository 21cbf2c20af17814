//! Transaction scope state machine
//!
//! A scope starts `Pending` and moves exactly once to `Committed` or
//! `Aborted`. Callbacks can only be queued while pending. A nested scope
//! hands its queue to the parent when it commits and drops it when it
//! aborts.

use super::callbacks::{Callback, CallbackKind, CallbackRecord};
use entcache_core::{CacheError, Result, TransactionPhase};
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug)]
struct ScopeState {
    phase: TransactionPhase,
    callbacks: Vec<CallbackRecord>,
}

pub struct TransactionScope {
    id: Uuid,
    depth: usize,
    state: Mutex<ScopeState>,
}

impl std::fmt::Debug for TransactionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TransactionScope")
            .field("id", &self.id)
            .field("depth", &self.depth)
            .field("phase", &state.phase)
            .field("queued", &state.callbacks.len())
            .finish()
    }
}

impl TransactionScope {
    pub(crate) fn root() -> Arc<Self> {
        Arc::new(Self::with_depth(0))
    }

    /// Open a scope nested inside this one
    pub(crate) fn nested(&self) -> Result<Arc<Self>> {
        self.ensure_pending()?;
        Ok(Arc::new(Self::with_depth(self.depth + 1)))
    }

    fn with_depth(depth: usize) -> Self {
        Self {
            id: Uuid::new_v4(),
            depth,
            state: Mutex::new(ScopeState {
                phase: TransactionPhase::Pending,
                callbacks: Vec::new(),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Zero for the outermost transaction
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn phase(&self) -> TransactionPhase {
        self.state.lock().phase
    }

    pub fn queued_callbacks(&self) -> usize {
        self.state.lock().callbacks.len()
    }

    fn ensure_pending(&self) -> Result<()> {
        match self.phase() {
            TransactionPhase::Pending => Ok(()),
            actual => Err(CacheError::transaction_state(actual)),
        }
    }

    pub(crate) fn push(&self, kind: CallbackKind, callback: Callback) -> Result<()> {
        let mut state = self.state.lock();
        if state.phase != TransactionPhase::Pending {
            return Err(CacheError::transaction_state(state.phase));
        }
        state.callbacks.push(CallbackRecord::new(kind, callback));
        Ok(())
    }

    /// Remove the pre-commit callbacks, ordered by ascending `order`
    ///
    /// Callbacks sharing an order keep their queue order.
    pub(crate) fn take_pre_commit(&self) -> Result<Vec<Callback>> {
        let mut state = self.state.lock();
        if state.phase != TransactionPhase::Pending {
            return Err(CacheError::transaction_state(state.phase));
        }
        let (mut pre_commit, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut state.callbacks)
            .into_iter()
            .partition(|record| matches!(record.kind, CallbackKind::PreCommit { .. }));
        state.callbacks = rest;

        pre_commit.sort_by_key(|record| match record.kind {
            CallbackKind::PreCommit { order } => order,
            _ => 0,
        });
        Ok(pre_commit.into_iter().map(|record| record.callback).collect())
    }

    /// Move to `Committed` and hand back the queued callbacks
    pub(crate) fn mark_committed(&self) -> Result<Vec<CallbackRecord>> {
        let mut state = self.state.lock();
        if state.phase != TransactionPhase::Pending {
            return Err(CacheError::transaction_state(state.phase));
        }
        state.phase = TransactionPhase::Committed;
        Ok(std::mem::take(&mut state.callbacks))
    }

    /// Commit a nested scope into its parent's queue
    pub(crate) fn promote_into(&self, parent: &TransactionScope) -> Result<usize> {
        parent.ensure_pending()?;
        let callbacks = self.mark_committed()?;
        let promoted = callbacks.len();
        let mut parent_state = parent.state.lock();
        if parent_state.phase != TransactionPhase::Pending {
            return Err(CacheError::transaction_state(parent_state.phase));
        }
        parent_state.callbacks.extend(callbacks);
        Ok(promoted)
    }

    /// Move to `Aborted`, dropping every queued callback
    ///
    /// Returns the number of callbacks discarded. Aborting a finished scope
    /// changes nothing.
    pub(crate) fn abort(&self) -> usize {
        let mut state = self.state.lock();
        if state.phase != TransactionPhase::Pending {
            return 0;
        }
        state.phase = TransactionPhase::Aborted;
        let discarded = state.callbacks.len();
        state.callbacks.clear();
        discarded
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::callbacks::callback;

    fn noop() -> Callback {
        callback(|| async { Ok(()) })
    }

    #[test]
    fn pending_scope_accepts_callbacks() {
        let scope = TransactionScope::root();
        scope.push(CallbackKind::Invalidation, noop()).unwrap();
        scope.push(CallbackKind::PostCommit, noop()).unwrap();
        assert_eq!(scope.queued_callbacks(), 2);
        assert_eq!(scope.phase(), TransactionPhase::Pending);
    }

    #[test]
    fn committed_scope_rejects_callbacks() {
        let scope = TransactionScope::root();
        scope.push(CallbackKind::Invalidation, noop()).unwrap();
        assert_eq!(scope.mark_committed().unwrap().len(), 1);

        let error = scope.push(CallbackKind::Invalidation, noop()).unwrap_err();
        assert!(matches!(
            error,
            CacheError::TransactionState {
                actual: TransactionPhase::Committed,
                ..
            }
        ));
        assert!(scope.mark_committed().is_err());
    }

    #[test]
    fn abort_discards_once() {
        let scope = TransactionScope::root();
        scope.push(CallbackKind::PostCommit, noop()).unwrap();
        assert_eq!(scope.abort(), 1);
        assert_eq!(scope.abort(), 0);
        assert_eq!(scope.phase(), TransactionPhase::Aborted);
        assert!(scope.push(CallbackKind::PostCommit, noop()).is_err());
    }

    #[test]
    fn nested_commit_promotes_to_parent() {
        let parent = TransactionScope::root();
        let child = parent.nested().unwrap();
        assert_eq!(child.depth(), 1);
        child.push(CallbackKind::Invalidation, noop()).unwrap();
        child.push(CallbackKind::PreCommit { order: 1 }, noop()).unwrap();

        assert_eq!(child.promote_into(&parent).unwrap(), 2);
        assert_eq!(parent.queued_callbacks(), 2);
        assert_eq!(child.phase(), TransactionPhase::Committed);
    }

    #[test]
    fn nested_abort_leaves_parent_untouched() {
        let parent = TransactionScope::root();
        parent.push(CallbackKind::Invalidation, noop()).unwrap();
        let child = parent.nested().unwrap();
        child.push(CallbackKind::Invalidation, noop()).unwrap();

        assert_eq!(child.abort(), 1);
        assert_eq!(parent.queued_callbacks(), 1);
        assert_eq!(parent.phase(), TransactionPhase::Pending);
    }

    #[test]
    fn pre_commit_sorted_by_order() {
        let scope = TransactionScope::root();
        scope.push(CallbackKind::PostCommit, noop()).unwrap();
        scope.push(CallbackKind::PreCommit { order: 5 }, noop()).unwrap();
        scope.push(CallbackKind::PreCommit { order: -1 }, noop()).unwrap();

        assert_eq!(scope.take_pre_commit().unwrap().len(), 2);
        assert_eq!(scope.queued_callbacks(), 1);
    }
}
