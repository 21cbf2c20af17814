//! Per-entity cache configuration

use entcache_core::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Table, schema cache version and field mapping for one entity type
///
/// Bumping `cache_key_version` moves every key of the entity to a fresh
/// namespace, which invalidates all of its entries at once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityConfiguration {
    pub table_name: String,
    pub cache_key_version: u32,
    /// Entity field name to storage column name
    #[serde(default)]
    columns: BTreeMap<String, String>,
    #[serde(default)]
    cacheable_fields: BTreeSet<String>,
}

impl EntityConfiguration {
    pub fn new(table_name: impl Into<String>, cache_key_version: u32) -> Self {
        Self {
            table_name: table_name.into(),
            cache_key_version,
            columns: BTreeMap::new(),
            cacheable_fields: BTreeSet::new(),
        }
    }

    /// Map a field that is loaded but never cached
    pub fn with_field(mut self, field: impl Into<String>, column: impl Into<String>) -> Self {
        self.columns.insert(field.into(), column.into());
        self
    }

    /// Map a field whose values are unique, so loads by it can be cached
    pub fn with_cacheable_field(
        mut self,
        field: impl Into<String>,
        column: impl Into<String>,
    ) -> Self {
        let field = field.into();
        self.columns.insert(field.clone(), column.into());
        self.cacheable_fields.insert(field);
        self
    }

    pub fn column_for(&self, field: &str) -> Result<&str> {
        self.columns.get(field).map(String::as_str).ok_or_else(|| {
            CacheError::configuration(format!(
                "no column mapping for field '{field}' on table '{}'",
                self.table_name
            ))
        })
    }

    pub fn is_cacheable(&self, field: &str) -> bool {
        self.cacheable_fields.contains(field)
    }

    pub fn cacheable_fields(&self) -> impl Iterator<Item = &str> {
        self.cacheable_fields.iter().map(String::as_str)
    }

    /// Check a deserialized configuration for unmapped cacheable fields
    pub fn validate(&self) -> Result<()> {
        if self.table_name.is_empty() {
            return Err(CacheError::configuration("entity table name is empty"));
        }
        match self
            .cacheable_fields
            .iter()
            .find(|field| !self.columns.contains_key(*field))
        {
            Some(field) => Err(CacheError::configuration(format!(
                "cacheable field '{field}' on table '{}' has no column mapping",
                self.table_name
            ))),
            None => Ok(()),
        }
    }
}
