//! Shared utilities for the entcache workspace
//!
//! - **`resilience`**: backend timeouts and transient-error retries.
//! - **`tracing`**: subscriber initialisation and span helpers.

pub mod resilience;
pub mod tracing;

pub use resilience::*;
