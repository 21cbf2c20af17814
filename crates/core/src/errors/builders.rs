//! Builder methods for creating errors with context

use super::types::{BackendKind, CacheError, SerializationOp, TransactionPhase, TransientReason};

impl CacheError {
    /// Create a transient backend error
    #[must_use]
    pub fn transient(
        backend: BackendKind,
        operation: &'static str,
        reason: TransientReason,
        message: impl Into<String>,
    ) -> Self {
        CacheError::Transient {
            backend,
            operation,
            reason,
            message: message.into(),
        }
    }

    /// Create a transient error for a call that exceeded its deadline
    #[must_use]
    pub fn timeout(backend: BackendKind, operation: &'static str, after: std::time::Duration) -> Self {
        CacheError::Transient {
            backend,
            operation,
            reason: TransientReason::Timeout,
            message: format!("no response after {after:?}"),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        CacheError::Configuration {
            message: message.into(),
        }
    }

    /// Create a decode error for a cached payload
    #[must_use]
    pub fn decode(key: impl Into<String>, source: serde_json::Error) -> Self {
        CacheError::Serialization {
            key: key.into(),
            operation: SerializationOp::Decode,
            source,
        }
    }

    /// Create an encode error for a value about to be cached
    #[must_use]
    pub fn encode(key: impl Into<String>, source: serde_json::Error) -> Self {
        CacheError::Serialization {
            key: key.into(),
            operation: SerializationOp::Encode,
            source,
        }
    }

    /// Create an error for a scope used outside the pending phase
    #[must_use]
    pub fn transaction_state(actual: TransactionPhase) -> Self {
        CacheError::TransactionState {
            expected: TransactionPhase::Pending,
            actual,
        }
    }

    /// Create an error reported by the system of record
    #[must_use]
    pub fn store(operation: &'static str, message: impl Into<String>) -> Self {
        CacheError::Store {
            operation,
            message: message.into(),
        }
    }
}
