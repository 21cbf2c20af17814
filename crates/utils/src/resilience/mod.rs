//! Resilience helpers for cache backend calls.
//!
//! ## Key Components
//!
//! - **`timeout`**: bounds a backend round trip and reports an elapsed
//!   deadline as the transient error kind.
//! - **`retry`**: exponential backoff with jitter for operations that fail
//!   transiently.

pub mod retry;
pub mod timeout;

pub use retry::{retry, RetryConfig, RetryOn};
pub use timeout::with_timeout;
