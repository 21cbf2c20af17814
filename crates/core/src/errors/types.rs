//! Core error types for the entity cache

use std::fmt;

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Re-export CacheError as Error for callers that prefer the short name
pub use CacheError as Error;

/// Error type shared by every cache tier and coordinator.
///
/// Callers are expected to branch on the *class* of an error rather than on
/// individual variants: transient errors mean "cache unavailable, go to the
/// system of record", configuration errors mean "fix the code".
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Connection, timeout or protocol failure talking to a cache tier
    #[error("{backend} backend unavailable during {operation} ({reason}): {message}")]
    Transient {
        backend: BackendKind,
        operation: &'static str,
        reason: TransientReason,
        message: String,
    },

    /// Programmer error: bad shard assignment, unknown field, invalid options
    #[error("cache configuration error: {message}")]
    Configuration { message: String },

    /// A payload could not be encoded or decoded
    #[error("failed to {operation} cache payload for key '{key}': {source}")]
    Serialization {
        key: String,
        operation: SerializationOp,
        #[source]
        source: serde_json::Error,
    },

    /// A transaction scope was used after it left the pending state
    #[error("transaction scope is {actual}, expected {expected}")]
    TransactionState {
        expected: TransactionPhase,
        actual: TransactionPhase,
    },

    /// Failure raised by the system of record collaborator
    #[error("system of record error during {operation}: {message}")]
    Store {
        operation: &'static str,
        message: String,
    },
}

/// Which family of backend produced a transient failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    LocalMemory,
    Redis,
    Sharded,
    Composed,
    Custom(&'static str),
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalMemory => write!(f, "local-memory"),
            Self::Redis => write!(f, "redis"),
            Self::Sharded => write!(f, "sharded"),
            Self::Composed => write!(f, "composed"),
            Self::Custom(name) => write!(f, "{name}"),
        }
    }
}

/// Why a backend call was classified as transient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransientReason {
    Connection,
    Timeout,
    Protocol,
}

impl fmt::Display for TransientReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection => write!(f, "connection"),
            Self::Timeout => write!(f, "timeout"),
            Self::Protocol => write!(f, "protocol"),
        }
    }
}

/// Serialization operation types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializationOp {
    Encode,
    Decode,
}

impl fmt::Display for SerializationOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encode => write!(f, "encode"),
            Self::Decode => write!(f, "decode"),
        }
    }
}

/// Lifecycle phase of a transaction scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionPhase {
    Pending,
    Committed,
    Aborted,
}

impl fmt::Display for TransactionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Committed => write!(f, "committed"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}
