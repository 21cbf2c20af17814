//! Outcome of a cache lookup

use serde::{Deserialize, Serialize};

/// Status of a single key after a batch load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CacheStatus {
    Hit,
    Miss,
    Negative,
}

/// Per-key result of `load_many`
///
/// `Negative` means the system of record confirmed the row does not exist;
/// `Miss` means the cache knows nothing about the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheLoadResult<V> {
    Hit(V),
    Miss,
    Negative,
}

impl<V> CacheLoadResult<V> {
    pub fn status(&self) -> CacheStatus {
        match self {
            Self::Hit(_) => CacheStatus::Hit,
            Self::Miss => CacheStatus::Miss,
            Self::Negative => CacheStatus::Negative,
        }
    }

    /// Whether later tiers or the system of record need to be consulted
    pub fn is_resolved(&self) -> bool {
        !matches!(self, Self::Miss)
    }

    pub fn into_item(self) -> Option<V> {
        match self {
            Self::Hit(item) => Some(item),
            Self::Miss | Self::Negative => None,
        }
    }

    pub fn item(&self) -> Option<&V> {
        match self {
            Self::Hit(item) => Some(item),
            Self::Miss | Self::Negative => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_and_resolution() {
        let hit = CacheLoadResult::Hit(3);
        assert_eq!(hit.status(), CacheStatus::Hit);
        assert!(hit.is_resolved());
        assert_eq!(hit.into_item(), Some(3));

        let negative: CacheLoadResult<i32> = CacheLoadResult::Negative;
        assert!(negative.is_resolved());
        assert_eq!(negative.item(), None);

        let miss: CacheLoadResult<i32> = CacheLoadResult::Miss;
        assert!(!miss.is_resolved());
        assert_eq!(miss.status(), CacheStatus::Miss);
    }
}
