//! Transactional invalidation ordering
//!
//! Cache mutations triggered by a write are queued on the enclosing
//! transaction and only reach the cache after the store commits.
//! Invalidations run before any other post-commit work, so a callback that
//! re-reads an entity never sees the pre-write cache entry.

mod callbacks;
mod query_context;
mod runner;
mod scope;

pub use callbacks::{callback, Callback, CallbackFuture, CallbackKind};
pub use query_context::QueryContext;
pub use runner::{run_in_transaction, TransactionHandle};
pub use scope::TransactionScope;
