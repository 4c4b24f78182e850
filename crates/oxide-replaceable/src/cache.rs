//! Memoized comparables.

use std::collections::HashMap;
use std::fmt;

use crate::comparable::Comparable;
use crate::entity::Entity;

/// Which comparable is being asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComparisonKind {
    /// Is this the same addressable object?
    Identity,
    /// Is this object functionally identical?
    Definition,
}

impl ComparisonKind {
    /// Returns the lowercase name of the comparison.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Definition => "definition",
        }
    }
}

impl fmt::Display for ComparisonKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cache key: entity kind, comparison kind and every field of the entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    kind: &'static str,
    comparison: ComparisonKind,
    schema: String,
    signature: String,
    definition: String,
}

impl CacheKey {
    /// Builds the key for `entity`.
    #[must_use]
    pub fn new(entity: &Entity, comparison: ComparisonKind) -> Self {
        Self {
            kind: entity.kind_name(),
            comparison,
            schema: entity.schema().to_string(),
            signature: entity.signature().to_string(),
            definition: entity.definition().to_string(),
        }
    }
}

/// Comparables computed so far.
///
/// Entities are immutable, so an entry never goes stale and is never
/// evicted. The cache is not synchronized; give each concurrent plan
/// computation its own instance.
#[derive(Debug, Default)]
pub struct ComparisonCache {
    entries: HashMap<CacheKey, Comparable>,
    hits: u64,
    misses: u64,
}

impl ComparisonCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a comparable, counting the hit or miss.
    pub fn get(&mut self, key: &CacheKey) -> Option<Comparable> {
        match self.entries.get(key) {
            Some(comparable) => {
                self.hits += 1;
                Some(comparable.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Stores a comparable.
    pub fn insert(&mut self, key: CacheKey, comparable: Comparable) {
        self.entries.insert(key, comparable);
    }

    /// Returns the number of cached comparables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns how many lookups were answered from the cache.
    #[must_use]
    pub fn hits(&self) -> u64 {
        self.hits
    }

    /// Returns how many lookups had to be computed.
    #[must_use]
    pub fn misses(&self) -> u64 {
        self.misses
    }
}
