//! Error classification used by callers deciding between retry, fallback
//! and failing loudly

use super::types::CacheError;

impl CacheError {
    /// Transient errors mean the cache is unavailable; fall back to the
    /// system of record and optionally retry later.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Configuration errors need a code fix, never a retry.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Configuration { .. } | Self::TransactionState { .. }
        )
    }

    /// Serialization errors are scoped to a single key.
    #[must_use]
    pub const fn is_serialization(&self) -> bool {
        matches!(self, Self::Serialization { .. })
    }
}
