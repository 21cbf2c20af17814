/// Constants shared across the entcache crates
// Key construction
pub const DEFAULT_KEY_DELIMITER: char = ':';
pub const KEY_ESCAPE: char = '\\';
pub const DEFAULT_CACHE_KEY_PREFIX: &str = "entity-cache";

// TTLs (seconds)
pub const DEFAULT_TTL_SECONDS_POSITIVE: u64 = 86_400;
pub const DEFAULT_TTL_SECONDS_NEGATIVE: u64 = 600;
pub const MAX_TTL_SECONDS: u64 = 10 * 365 * 86_400;

// In-process tier bounds
pub const DEFAULT_LOCAL_MAX_ENTRIES: usize = 10_000;
pub const DEFAULT_LOCAL_MAX_SIZE_BYTES: u64 = 64 * 1024 * 1024;

// Backend behaviour
pub const DEFAULT_BACKEND_TIMEOUT_MS: u64 = 500;
pub const DEFAULT_SHARDING_SCHEME_VERSION: u32 = 1;

// Reserved Redis value marking a confirmed-absent record
pub const REDIS_NEGATIVE_SENTINEL: &str = "";

// Environment variable names
pub const ENV_CONFIG_PATH: &str = "ENTCACHE_CONFIG";
pub const ENV_CACHE_KEY_PREFIX: &str = "ENTCACHE_CACHE_KEY_PREFIX";
pub const ENV_KEY_DELIMITER: &str = "ENTCACHE_KEY_DELIMITER";
pub const ENV_SHARDING_SCHEME_VERSION: &str = "ENTCACHE_SHARDING_SCHEME_VERSION";
pub const ENV_TTL_SECONDS_POSITIVE: &str = "ENTCACHE_TTL_SECONDS_POSITIVE";
pub const ENV_TTL_SECONDS_NEGATIVE: &str = "ENTCACHE_TTL_SECONDS_NEGATIVE";
pub const ENV_LOCAL_MAX_ENTRIES: &str = "ENTCACHE_LOCAL_MAX_ENTRIES";
pub const ENV_LOCAL_MAX_SIZE_BYTES: &str = "ENTCACHE_LOCAL_MAX_SIZE_BYTES";
pub const ENV_BACKEND_TIMEOUT_MS: &str = "ENTCACHE_BACKEND_TIMEOUT_MS";
pub const ENV_INVALIDATION_STRATEGY: &str = "ENTCACHE_INVALIDATION_STRATEGY";
pub const ENV_LOG: &str = "ENTCACHE_LOG";
