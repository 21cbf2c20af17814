//! Entity-level caching
//!
//! - **`configuration`**: table, schema cache version and field mapping
//! - **`adapter`**: field-level keys and batch operations over a cacher
//! - **`read_through`**: cache-then-fetch loading with write-back
//! - **`invalidator`**: post-commit invalidation of written entities

mod adapter;
mod configuration;
mod invalidator;
mod read_through;

pub use adapter::EntityCacheAdapter;
pub use configuration::EntityConfiguration;
pub use invalidator::{EntityCacheInvalidator, FieldValues};
pub use read_through::{ReadThroughEntityCache, RecordFetcher};

use std::collections::{BTreeMap, HashMap};

/// Access to an entity's field values in their cache-key form
pub trait EntityFields {
    /// `None` when the field is unset
    fn field_value(&self, field: &str) -> Option<String>;
}

impl EntityFields for HashMap<String, String> {
    fn field_value(&self, field: &str) -> Option<String> {
        self.get(field).cloned()
    }
}

impl EntityFields for BTreeMap<String, String> {
    fn field_value(&self, field: &str) -> Option<String> {
        self.get(field).cloned()
    }
}

impl EntityFields for serde_json::Map<String, serde_json::Value> {
    fn field_value(&self, field: &str) -> Option<String> {
        match self.get(field)? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}
