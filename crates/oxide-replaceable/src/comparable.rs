//! Database-computed comparables.
//!
//! Source text is a poor equality oracle: the server canonicalizes types,
//! whitespace and casing in its own way. Instead, an entity is materialized
//! in a [`Sandbox`] and a compare query reads back what the server made of
//! it. The resulting row is the entity's [`Comparable`].

use tracing::trace;

use crate::cache::{CacheKey, ComparisonCache, ComparisonKind};
use crate::entity::{Entity, escape_like, list_from_database};
use crate::error::{ReplaceError, Result};
use crate::sandbox::Sandbox;
use crate::session::{Row, Session};

/// An opaque, ordered tuple returned by a compare query.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Comparable(Row);

impl Comparable {
    /// Wraps a result row.
    #[must_use]
    pub fn new(row: Row) -> Self {
        Self(row)
    }

    /// Returns the row values.
    #[must_use]
    pub fn values(&self) -> &[Option<String>] {
        &self.0
    }
}

/// Computes and compares comparables, memoizing them in a [`ComparisonCache`].
pub struct Comparator<'c> {
    cache: &'c mut ComparisonCache,
}

impl<'c> Comparator<'c> {
    /// Creates a comparator backed by `cache`.
    pub fn new(cache: &'c mut ComparisonCache) -> Self {
        Self { cache }
    }

    /// Returns what the server considers `entity`'s address.
    pub async fn identity(
        &mut self,
        session: &mut dyn Session,
        entity: &Entity,
    ) -> Result<Comparable> {
        self.comparable(session, entity, ComparisonKind::Identity)
            .await
    }

    /// Returns the server's canonical view of `entity`'s whole definition.
    pub async fn definition(
        &mut self,
        session: &mut dyn Session,
        entity: &Entity,
    ) -> Result<Comparable> {
        self.comparable(session, entity, ComparisonKind::Definition)
            .await
    }

    /// Returns whether `a` and `b` address the same object.
    pub async fn is_equal_identity(
        &mut self,
        session: &mut dyn Session,
        a: &Entity,
        b: &Entity,
    ) -> Result<bool> {
        let left = self.identity(session, a).await?;
        let right = self.identity(session, b).await?;
        Ok(left == right)
    }

    /// Returns whether `a` and `b` are functionally identical.
    pub async fn is_equal_definition(
        &mut self,
        session: &mut dyn Session,
        a: &Entity,
        b: &Entity,
    ) -> Result<bool> {
        let left = self.definition(session, a).await?;
        let right = self.definition(session, b).await?;
        Ok(left == right)
    }

    /// Looks up the live counterpart of `entity`, if there is one.
    pub async fn database_definition(
        &mut self,
        session: &mut dyn Session,
        entity: &Entity,
    ) -> Result<Option<Entity>> {
        let schema = escape_like(entity.schema());
        let live = list_from_database(entity.kind(), session, &schema).await?;
        for candidate in live {
            if self.is_equal_identity(session, entity, &candidate).await? {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    async fn comparable(
        &mut self,
        session: &mut dyn Session,
        entity: &Entity,
        comparison: ComparisonKind,
    ) -> Result<Comparable> {
        let key = CacheKey::new(entity, comparison);
        if let Some(cached) = self.cache.get(&key) {
            trace!(entity = %entity, %comparison, "Comparable cache hit");
            return Ok(cached);
        }

        let query = match comparison {
            ComparisonKind::Identity => entity.identity_query(),
            ComparisonKind::Definition => entity.definition_query(),
        };

        let mut sandbox = Sandbox::enter(session, std::slice::from_ref(entity)).await?;
        let row = sandbox.session().fetch_optional(&query).await;
        sandbox.rollback().await?;

        let comparable = match row? {
            Some(row) => Comparable::new(row),
            None => {
                return Err(ReplaceError::ComparableNotFound {
                    entity: entity.identity(),
                    comparison: comparison.as_str(),
                });
            }
        };

        trace!(entity = %entity, %comparison, "Computed comparable");
        self.cache.insert(key, comparable.clone());
        Ok(comparable)
    }
}
