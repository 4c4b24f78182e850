//! Plan computation.
//!
//! The [`DiffEngine`] compares declared entities with the live database and
//! returns the operations that bring the database in line:
//!
//! 1. Reject duplicate identities before touching the database.
//! 2. Work out which schemas are observed.
//! 3. Order the declared entities with [`resolve`].
//! 4. For each entity, with its predecessors materialized, decide between
//!    nothing, `Replace` and `Create` using comparables.
//! 5. Emit a `Drop` for every live entity in an observed schema that has no
//!    declared counterpart.
//!
//! Everything runs inside one outer transaction scope that is rolled back
//! when the computation ends, so planning never changes the database.
//!
//! Drops come last and are not ordered against each other. Dropping an
//! entity that another live, undeclared entity depends on may therefore need
//! manual reordering.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cache::ComparisonCache;
use crate::comparable::Comparator;
use crate::entity::{Entity, EntityKind, escape_like, list_from_database};
use crate::error::{ReplaceError, Result};
use crate::kinds::default_kinds;
use crate::operations::MigrationOp;
use crate::resolver::{ResolvedOrder, resolve};
use crate::sandbox::Sandbox;
use crate::session::Session;

/// Which schemas a plan looks at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanOptions {
    /// Schemas to observe in addition to the declared entities' schemas.
    pub schemas: Vec<String>,
    /// Schemas to ignore when looking for entities to drop.
    pub exclude_schemas: Vec<String>,
    /// Schemas referenced by the host application's table metadata.
    pub metadata_schemas: Vec<String>,
}

impl PlanOptions {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Observes an additional schema.
    #[must_use]
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schemas.push(schema.into());
        self
    }

    /// Ignores a schema.
    #[must_use]
    pub fn exclude_schema(mut self, schema: impl Into<String>) -> Self {
        self.exclude_schemas.push(schema.into());
        self
    }

    /// Observes a schema referenced by table metadata.
    #[must_use]
    pub fn with_metadata_schema(mut self, schema: impl Into<String>) -> Self {
        self.metadata_schemas.push(schema.into());
        self
    }

    /// Returns the observed schemas for a set of declared entities.
    #[must_use]
    pub fn observed_schemas(&self, declared: &[Entity]) -> BTreeSet<String> {
        let excluded: HashSet<&str> = self.exclude_schemas.iter().map(String::as_str).collect();

        self.schemas
            .iter()
            .chain(&self.metadata_schemas)
            .map(String::as_str)
            .chain(declared.iter().map(Entity::schema))
            .filter(|schema| !excluded.contains(schema))
            .map(str::to_string)
            .collect()
    }
}

/// Computes migration plans for declared entities.
pub struct DiffEngine {
    kinds: Vec<&'static dyn EntityKind>,
    options: PlanOptions,
    cache: ComparisonCache,
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DiffEngine {
    /// Creates an engine for the built-in entity kinds.
    #[must_use]
    pub fn new() -> Self {
        Self {
            kinds: default_kinds(),
            options: PlanOptions::default(),
            cache: ComparisonCache::new(),
        }
    }

    /// Replaces the registered entity kinds.
    #[must_use]
    pub fn with_kinds(mut self, kinds: Vec<&'static dyn EntityKind>) -> Self {
        self.kinds = kinds;
        self
    }

    /// Replaces the options.
    #[must_use]
    pub fn with_options(mut self, options: PlanOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns the registered entity kinds.
    #[must_use]
    pub fn kinds(&self) -> &[&'static dyn EntityKind] {
        &self.kinds
    }

    /// Returns the options.
    #[must_use]
    pub fn options(&self) -> &PlanOptions {
        &self.options
    }

    /// Returns the comparable cache.
    #[must_use]
    pub fn cache(&self) -> &ComparisonCache {
        &self.cache
    }

    /// Returns the operations that bring the database in line with `declared`.
    ///
    /// Creates and replaces come first, producers before consumers, followed
    /// by drops. The database is left unchanged.
    pub async fn compute_plan(
        &mut self,
        session: &mut dyn Session,
        declared: &[Entity],
    ) -> Result<Vec<MigrationOp>> {
        ensure_unique_identities(declared)?;
        let observed = self.options.observed_schemas(declared);
        debug!(schemas = ?observed, "Observed schemas");

        let mut outer = Sandbox::enter(session, &[]).await?;
        let result = self.plan_within(outer.session(), declared, &observed).await;
        let rolled_back = outer.rollback().await;

        let ops = result?;
        rolled_back?;
        info!(operations = ops.len(), "Computed plan");
        Ok(ops)
    }

    /// Returns the operations that undo `upgrade`.
    ///
    /// Must run before `upgrade` is applied: every `Replace` becomes a
    /// `Revert` carrying the definition that is live right now.
    pub async fn downgrade(
        &mut self,
        session: &mut dyn Session,
        upgrade: &[MigrationOp],
    ) -> Result<Vec<MigrationOp>> {
        let mut outer = Sandbox::enter(session, &[]).await?;
        let result = self.downgrade_within(outer.session(), upgrade).await;
        let rolled_back = outer.rollback().await;

        let ops = result?;
        rolled_back?;
        Ok(ops)
    }

    async fn plan_within(
        &mut self,
        session: &mut dyn Session,
        declared: &[Entity],
        observed: &BTreeSet<String>,
    ) -> Result<Vec<MigrationOp>> {
        let order = resolve(session, declared).await?;
        ensure_fully_resolved(&order, declared)?;

        let mut comparator = Comparator::new(&mut self.cache);
        let mut ops = Vec::new();

        for (index, entity) in order.iter().enumerate() {
            let mut sandbox = Sandbox::enter(session, order.predecessors(index)).await?;
            let op = required_op(&mut comparator, sandbox.session(), entity).await;
            sandbox.rollback().await?;

            match op? {
                Some(op @ MigrationOp::Create(_)) => {
                    info!(
                        schema = %entity.schema(),
                        signature = %entity.signature(),
                        "Detected added entity"
                    );
                    ops.push(op);
                }
                Some(op) => {
                    info!(
                        schema = %entity.schema(),
                        signature = %entity.signature(),
                        "Detected updated entity"
                    );
                    ops.push(op);
                }
                None => debug!(entity = %entity, "Entity up to date"),
            }
        }

        for schema in observed {
            let pattern = escape_like(schema);
            for &kind in &self.kinds {
                for live in list_from_database(kind, session, &pattern).await? {
                    if is_declared(&mut comparator, session, declared, &live).await? {
                        continue;
                    }
                    info!(
                        schema = %live.schema(),
                        signature = %live.signature(),
                        "Detected removed entity"
                    );
                    ops.push(MigrationOp::Drop(live));
                }
            }
        }

        Ok(ops)
    }

    async fn downgrade_within(
        &mut self,
        session: &mut dyn Session,
        upgrade: &[MigrationOp],
    ) -> Result<Vec<MigrationOp>> {
        let mut comparator = Comparator::new(&mut self.cache);
        let mut ops = Vec::with_capacity(upgrade.len());

        for op in upgrade.iter().rev() {
            let reverse = match op.reverse()? {
                MigrationOp::Revert(target) => {
                    let live = comparator
                        .database_definition(session, &target)
                        .await?
                        .ok_or_else(|| ReplaceError::MissingLiveDefinition {
                            entity: target.identity(),
                        })?;
                    MigrationOp::Revert(live)
                }
                other => other,
            };
            ops.push(reverse);
        }

        Ok(ops)
    }
}

/// Computes a plan with the built-in entity kinds and a fresh cache.
pub async fn compute_plan(
    session: &mut dyn Session,
    declared: &[Entity],
    schemas: &[&str],
    exclude_schemas: &[&str],
) -> Result<Vec<MigrationOp>> {
    let options = PlanOptions {
        schemas: schemas.iter().map(|s| (*s).to_string()).collect(),
        exclude_schemas: exclude_schemas.iter().map(|s| (*s).to_string()).collect(),
        metadata_schemas: Vec::new(),
    };
    DiffEngine::new()
        .with_options(options)
        .compute_plan(session, declared)
        .await
}

fn ensure_unique_identities(declared: &[Entity]) -> Result<()> {
    let mut seen = HashSet::with_capacity(declared.len());
    for entity in declared {
        let identity = entity.identity();
        if !seen.insert(identity.clone()) {
            return Err(ReplaceError::DuplicateIdentity { identity });
        }
    }
    Ok(())
}

fn ensure_fully_resolved(order: &ResolvedOrder, declared: &[Entity]) -> Result<()> {
    match declared.iter().find(|entity| order.position(entity).is_none()) {
        Some(missing) => Err(ReplaceError::InternalConsistency(format!(
            "entity '{}' is missing from the resolved order",
            missing.identity()
        ))),
        None => Ok(()),
    }
}

/// Decides what `entity` needs, with its predecessors materialized.
async fn required_op(
    comparator: &mut Comparator<'_>,
    session: &mut dyn Session,
    entity: &Entity,
) -> Result<Option<MigrationOp>> {
    // Computed up front so that drop detection finds it in the cache, where
    // the predecessors it may depend on are no longer materialized.
    let identity = comparator.identity(session, entity).await?;

    let schema = escape_like(entity.schema());
    let mut matches = Vec::new();
    for live in list_from_database(entity.kind(), session, &schema).await? {
        if comparator.identity(session, &live).await? == identity {
            matches.push(live);
        }
    }

    if matches.is_empty() {
        return Ok(Some(MigrationOp::Create(entity.clone())));
    }
    for live in &matches {
        if comparator.is_equal_definition(session, entity, live).await? {
            return Ok(None);
        }
    }
    Ok(Some(MigrationOp::Replace(entity.clone())))
}

async fn is_declared(
    comparator: &mut Comparator<'_>,
    session: &mut dyn Session,
    declared: &[Entity],
    live: &Entity,
) -> Result<bool> {
    for entity in declared.iter().filter(|entity| entity.same_kind(live)) {
        if comparator.is_equal_identity(session, entity, live).await? {
            return Ok(true);
        }
    }
    Ok(false)
}
