//! Deferred callback records owned by a transaction scope

use entcache_core::Result;
use futures::future::BoxFuture;
use std::future::Future;

pub type CallbackFuture = BoxFuture<'static, Result<()>>;

/// A deferred unit of work, run at most once
pub type Callback = Box<dyn FnOnce() -> CallbackFuture + Send>;

/// Box an async closure as a [`Callback`]
pub fn callback<F, Fut>(f: F) -> Callback
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Box::new(move || Box::pin(f()))
}

/// When a queued callback runs relative to the commit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackKind {
    /// After commit, first phase
    Invalidation,
    /// After commit, once every invalidation finished
    PostCommit,
    /// Before the store commits, ascending by `order`
    PreCommit { order: i32 },
}

pub(crate) struct CallbackRecord {
    pub(crate) kind: CallbackKind,
    pub(crate) callback: Callback,
}

impl CallbackRecord {
    pub(crate) fn new(kind: CallbackKind, callback: Callback) -> Self {
        Self { kind, callback }
    }
}

impl std::fmt::Debug for CallbackRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRecord")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}
