//! Core errors, configuration and constants for the `entcache` workspace.
//!
//! ## Key Components
//!
//! - **`errors`**: the `CacheError` enum and `Result` alias. Errors are
//!   classified as transient (cache unavailable, fall back to the system of
//!   record), configuration (programmer error) or serialization (per key).
//! - **`config`**: the `CacheConfig` option surface and its layered loader.
//! - **`constants`**: defaults, the Redis negative sentinel and environment
//!   variable names.

pub mod config;
pub mod constants;
pub mod errors;

pub use self::{
    config::{CacheConfig, CacheConfigLoader, ConfigSource, InvalidationStrategy, LoadedConfig},
    constants::*,
    errors::{
        BackendKind, CacheError, Error, Result, SerializationOp, TransactionPhase, TransientReason,
    },
};
