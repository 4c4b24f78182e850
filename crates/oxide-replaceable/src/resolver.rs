//! Dependency ordering by trial materialization.
//!
//! Entities may reference each other (a view selecting from another view)
//! without declaring it, and reading references out of SQL bodies is not
//! reliable across object kinds. The resolver therefore asks the database:
//! an entity is placed once it can be created on top of everything placed
//! before it.
//!
//! Each pass tries every unplaced entity. For an acyclic graph at least one
//! entity is placed per pass, so `N` passes are enough for `N` entities.

use tracing::{debug, warn};

use crate::entity::Entity;
use crate::error::{ReplaceError, Result};
use crate::sandbox::{TrialOutcome, trial};
use crate::session::Session;

/// Entities in an order where every prefix can be materialized.
///
/// Only meaningful for the diff run that produced it.
#[derive(Debug, Clone, Default)]
pub struct ResolvedOrder {
    entities: Vec<Entity>,
}

impl ResolvedOrder {
    /// Returns the ordered entities.
    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Returns the entities placed before position `index`.
    #[must_use]
    pub fn predecessors(&self, index: usize) -> &[Entity] {
        &self.entities[..index.min(self.entities.len())]
    }

    /// Returns the position of `entity`, if it was placed.
    #[must_use]
    pub fn position(&self, entity: &Entity) -> Option<usize> {
        self.entities.iter().position(|e| e == entity)
    }

    /// Returns the number of placed entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns true if nothing was placed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Iterates over the ordered entities.
    pub fn iter(&self) -> std::slice::Iter<'_, Entity> {
        self.entities.iter()
    }
}

/// Orders `entities` so that each can be created after its predecessors.
///
/// Nothing is left behind in the database. Fails with
/// [`ReplaceError::SimulationFailure`] when some entity can never be
/// created, which covers both dependency cycles and invalid SQL.
pub async fn resolve(session: &mut dyn Session, entities: &[Entity]) -> Result<ResolvedOrder> {
    let mut resolved: Vec<Entity> = Vec::with_capacity(entities.len());
    let mut remaining: Vec<Entity> = entities.to_vec();

    for pass in 0..entities.len() {
        if remaining.is_empty() {
            break;
        }
        debug!(pass, remaining = remaining.len(), "Resolving entity order");

        let mut unplaced = Vec::new();
        for entity in remaining {
            resolved.push(entity);
            if let TrialOutcome::Failed { entity, error } = trial(session, &resolved).await? {
                debug!(entity = %entity, error = %error, "Entity not yet materializable");
                if let Some(entity) = resolved.pop() {
                    unplaced.push(entity);
                }
            }
        }
        remaining = unplaced;
    }

    let Some(stuck) = remaining.into_iter().next() else {
        return Ok(ResolvedOrder { entities: resolved });
    };

    // Run the failing trial once more so the caller sees the database error.
    warn!(entity = %stuck, "Entity could not be ordered");
    resolved.push(stuck.clone());
    match trial(session, &resolved).await? {
        TrialOutcome::Failed { error, .. } => Err(ReplaceError::SimulationFailure {
            entity: stuck.identity(),
            source: error,
        }),
        TrialOutcome::Materialized => Err(ReplaceError::InternalConsistency(format!(
            "entity '{}' materialized during final validation but was never placed",
            stuck.identity()
        ))),
    }
}
