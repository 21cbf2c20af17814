//! Concrete generic cachers
//!
//! - **`local_memory`**: bounded in-process LRU with TTLs
//! - **`registry`**: one in-process tier per table, shared explicitly
//! - **`redis`**: Redis tier over any [`RedisClient`](redis::RedisClient)

pub mod local_memory;
pub mod redis;
pub mod registry;

pub use self::local_memory::{LocalMemoryCacher, LocalMemoryOptions, ValueSizer};
pub use self::redis::{RedisCacher, RedisCacherOptions, RedisClient};
pub use self::registry::LocalMemoryCacheRegistry;
