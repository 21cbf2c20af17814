//! Error types and classification helpers for entity cache operations

mod builders;
mod classification;
mod conversions;
mod types;

pub use types::{
    BackendKind, CacheError, Error, Result, SerializationOp, TransactionPhase, TransientReason,
};
