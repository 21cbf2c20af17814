//! Conversion implementations for error types

use super::types::{CacheError, SerializationOp};

impl From<serde_json::Error> for CacheError {
    fn from(error: serde_json::Error) -> Self {
        CacheError::Serialization {
            key: String::new(),
            operation: SerializationOp::Decode,
            source: error,
        }
    }
}
