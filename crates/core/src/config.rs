//! Cache configuration with layered sources and validation
//!
//! Resolution order, lowest precedence first:
//! 1. Built-in defaults
//! 2. JSON file named by `ENTCACHE_CONFIG`
//! 3. `ENTCACHE_*` environment variables

use crate::constants::{
    DEFAULT_BACKEND_TIMEOUT_MS, DEFAULT_CACHE_KEY_PREFIX, DEFAULT_KEY_DELIMITER,
    DEFAULT_LOCAL_MAX_ENTRIES, DEFAULT_LOCAL_MAX_SIZE_BYTES, DEFAULT_SHARDING_SCHEME_VERSION,
    DEFAULT_TTL_SECONDS_NEGATIVE, DEFAULT_TTL_SECONDS_POSITIVE, ENV_BACKEND_TIMEOUT_MS,
    ENV_CACHE_KEY_PREFIX, ENV_CONFIG_PATH, ENV_INVALIDATION_STRATEGY, ENV_KEY_DELIMITER,
    ENV_LOCAL_MAX_ENTRIES, ENV_LOCAL_MAX_SIZE_BYTES, ENV_SHARDING_SCHEME_VERSION,
    ENV_TTL_SECONDS_NEGATIVE, ENV_TTL_SECONDS_POSITIVE, MAX_TTL_SECONDS,
};
use crate::errors::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Which cache-key versions are removed when an entity is invalidated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationStrategy {
    /// Only the key for the entity's current `cache_key_version`
    #[default]
    CurrentVersion,
    /// The current version plus one version either side, for rolling deploys
    SurroundingVersions,
}

impl FromStr for InvalidationStrategy {
    type Err = CacheError;

    fn from_str(value: &str) -> Result<Self> {
        match value.to_lowercase().replace('-', "_").as_str() {
            "current_version" | "current" => Ok(Self::CurrentVersion),
            "surrounding_versions" | "surrounding" => Ok(Self::SurroundingVersions),
            _ => Err(CacheError::configuration(format!(
                "unknown invalidation strategy '{value}'"
            ))),
        }
    }
}

/// Recognised cache options shared by every tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Human-readable namespace placed at the front of every key
    pub cache_key_prefix: String,
    /// Character joining key parts
    pub key_delimiter: char,
    /// Bump when the shard-assignment function changes
    pub sharding_scheme_version: u32,
    /// TTL for positive entries
    pub ttl_seconds_positive: u64,
    /// TTL for negative entries
    pub ttl_seconds_negative: u64,
    /// In-process tier entry bound
    pub local_max_entries: usize,
    /// In-process tier byte bound
    pub local_max_size_bytes: u64,
    /// Upper bound for a single backend round trip
    pub backend_timeout_ms: u64,
    pub invalidation_strategy: InvalidationStrategy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_key_prefix: DEFAULT_CACHE_KEY_PREFIX.to_string(),
            key_delimiter: DEFAULT_KEY_DELIMITER,
            sharding_scheme_version: DEFAULT_SHARDING_SCHEME_VERSION,
            ttl_seconds_positive: DEFAULT_TTL_SECONDS_POSITIVE,
            ttl_seconds_negative: DEFAULT_TTL_SECONDS_NEGATIVE,
            local_max_entries: DEFAULT_LOCAL_MAX_ENTRIES,
            local_max_size_bytes: DEFAULT_LOCAL_MAX_SIZE_BYTES,
            backend_timeout_ms: DEFAULT_BACKEND_TIMEOUT_MS,
            invalidation_strategy: InvalidationStrategy::default(),
        }
    }
}

impl CacheConfig {
    pub fn positive_ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds_positive)
    }

    pub fn negative_ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds_negative)
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_millis(self.backend_timeout_ms)
    }

    /// Reject option combinations that would break caching guarantees
    pub fn validate(&self) -> Result<()> {
        if self.ttl_seconds_positive == 0 || self.ttl_seconds_negative == 0 {
            return Err(CacheError::configuration(
                "ttl_seconds_positive and ttl_seconds_negative must be greater than zero",
            ));
        }
        if self.ttl_seconds_positive > MAX_TTL_SECONDS {
            return Err(CacheError::configuration(format!(
                "ttl_seconds_positive ({}) must not exceed {}",
                self.ttl_seconds_positive,
                MAX_TTL_SECONDS
            )));
        }
        if self.ttl_seconds_negative > self.ttl_seconds_positive {
            return Err(CacheError::configuration(format!(
                "ttl_seconds_negative ({}) must not exceed ttl_seconds_positive ({})",
                self.ttl_seconds_negative, self.ttl_seconds_positive
            )));
        }
        if self.backend_timeout_ms == 0 {
            return Err(CacheError::configuration(
                "backend_timeout_ms must be greater than zero",
            ));
        }
        if self.key_delimiter == crate::constants::KEY_ESCAPE {
            return Err(CacheError::configuration(format!(
                "key_delimiter cannot be the escape character '{}'",
                crate::constants::KEY_ESCAPE
            )));
        }
        Ok(())
    }
}

/// Source of configuration for debugging and precedence tracking
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Default,
    ConfigFile(PathBuf),
    EnvironmentVariable(String),
}

/// Configuration together with the highest-precedence source that touched it
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: CacheConfig,
    pub source: ConfigSource,
}

/// Loads configuration from defaults, an optional file and the environment
pub struct CacheConfigLoader;

impl CacheConfigLoader {
    /// Load and validate configuration from every source
    pub fn load() -> Result<LoadedConfig> {
        let mut loaded = LoadedConfig {
            config: CacheConfig::default(),
            source: ConfigSource::Default,
        };

        if let Some(path) = std::env::var_os(ENV_CONFIG_PATH).map(PathBuf::from) {
            loaded.config = Self::load_from_file(&path)?;
            loaded.source = ConfigSource::ConfigFile(path);
        }

        if Self::apply_env(&mut loaded.config)? {
            loaded.source = ConfigSource::EnvironmentVariable("ENTCACHE_*".to_string());
        }

        loaded.config.validate()?;
        tracing::debug!(source = ?loaded.source, "loaded cache configuration");
        Ok(loaded)
    }

    /// Parse a JSON configuration file; absent fields keep their defaults
    pub fn load_from_file(path: &std::path::Path) -> Result<CacheConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CacheError::configuration(format!(
                "failed to read config file '{}': {e}",
                path.display()
            ))
        })?;
        Self::parse(&content).map_err(|e| {
            CacheError::configuration(format!(
                "invalid config file '{}': {e}",
                path.display()
            ))
        })
    }

    /// Parse configuration from a JSON document
    pub fn parse(content: &str) -> std::result::Result<CacheConfig, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Apply `ENTCACHE_*` overrides, returning whether any were present
    pub fn apply_env(config: &mut CacheConfig) -> Result<bool> {
        Self::apply_overrides(config, |name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary lookup, used by `apply_env`
    pub fn apply_overrides<F>(config: &mut CacheConfig, lookup: F) -> Result<bool>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut touched = false;

        if let Some(prefix) = lookup(ENV_CACHE_KEY_PREFIX) {
            config.cache_key_prefix = prefix;
            touched = true;
        }
        if let Some(delimiter) = lookup(ENV_KEY_DELIMITER) {
            let mut chars = delimiter.chars();
            config.key_delimiter = match (chars.next(), chars.next()) {
                (Some(c), None) => c,
                _ => {
                    return Err(CacheError::configuration(format!(
                        "{ENV_KEY_DELIMITER} must be a single character, got '{delimiter}'"
                    )))
                }
            };
            touched = true;
        }
        if let Some(value) = lookup(ENV_SHARDING_SCHEME_VERSION) {
            config.sharding_scheme_version = parse_number(ENV_SHARDING_SCHEME_VERSION, &value)?;
            touched = true;
        }
        if let Some(value) = lookup(ENV_TTL_SECONDS_POSITIVE) {
            config.ttl_seconds_positive = parse_number(ENV_TTL_SECONDS_POSITIVE, &value)?;
            touched = true;
        }
        if let Some(value) = lookup(ENV_TTL_SECONDS_NEGATIVE) {
            config.ttl_seconds_negative = parse_number(ENV_TTL_SECONDS_NEGATIVE, &value)?;
            touched = true;
        }
        if let Some(value) = lookup(ENV_LOCAL_MAX_ENTRIES) {
            config.local_max_entries = parse_number(ENV_LOCAL_MAX_ENTRIES, &value)?;
            touched = true;
        }
        if let Some(value) = lookup(ENV_LOCAL_MAX_SIZE_BYTES) {
            config.local_max_size_bytes = parse_number(ENV_LOCAL_MAX_SIZE_BYTES, &value)?;
            touched = true;
        }
        if let Some(value) = lookup(ENV_BACKEND_TIMEOUT_MS) {
            config.backend_timeout_ms = parse_number(ENV_BACKEND_TIMEOUT_MS, &value)?;
            touched = true;
        }
        if let Some(value) = lookup(ENV_INVALIDATION_STRATEGY) {
            config.invalidation_strategy = value.parse()?;
            touched = true;
        }

        Ok(touched)
    }
}

fn parse_number<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse::<T>().map_err(|_| {
        CacheError::configuration(format!("{name} must be a non-negative integer, got '{value}'"))
    })
}
