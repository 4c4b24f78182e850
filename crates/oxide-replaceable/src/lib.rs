//! Declarative create-or-replace migrations for PostgreSQL.
//!
//! `oxide-replaceable` manages SQL objects whose whole body can be swapped
//! with a "create or replace" statement (views, functions). You declare the
//! entities you want; the planner compares them with the live database and
//! returns the operations that get it there:
//! - Equality is decided by the database itself, never by comparing source
//!   text
//! - Dependencies between entities are found by trial materialization, not
//!   by parsing SQL
//! - Planning never changes the database: all trials run in transaction
//!   scopes that are rolled back
//!
//! # Architecture
//!
//! - **Session** - Database handle with nested transaction scopes
//! - **Sandbox** - Always-rolled-back scope with entities materialized
//! - **Comparable** - Database-computed identity and definition, cached
//! - **Resolver** - Orders entities so that every prefix can be created
//! - **Diff** - Computes the upgrade (and downgrade) plan
//! - **Kinds** - PostgreSQL views and functions
//!
//! # Example
//!
//! ```rust,ignore
//! use oxide_replaceable::prelude::*;
//!
//! let declared = vec![
//!     Entity::new(&PgView, "public", "active_users", "select * from users where active"),
//!     Entity::new(&PgView, "public", "admins", "select * from active_users where admin"),
//! ];
//!
//! let mut session = PgSession::acquire(&pool).await?;
//! let mut engine = DiffEngine::new();
//! let upgrade = engine.compute_plan(&mut session, &declared).await?;
//! let downgrade = engine.downgrade(&mut session, &upgrade).await?;
//! drop(session);
//!
//! PlanExecutor::new(pool).apply(&upgrade).await?;
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Show the upgrade and downgrade SQL for a manifest
//! oxide-replaceable plan --manifest entities.json --downgrade
//!
//! # Apply it
//! oxide-replaceable apply --manifest entities.json
//! ```

pub mod cache;
pub mod comparable;
pub mod diff;
pub mod entity;
pub mod error;
pub mod executor;
pub mod kinds;
pub mod manifest;
pub mod operations;
pub mod resolver;
pub mod sandbox;
pub mod session;

#[cfg(test)]
mod testing;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::cache::{CacheKey, ComparisonCache, ComparisonKind};
    pub use crate::comparable::{Comparable, Comparator};
    pub use crate::diff::{DiffEngine, PlanOptions, compute_plan};
    pub use crate::entity::{Entity, EntityKind, list_from_database};
    pub use crate::error::{ReplaceError, Result};
    pub use crate::executor::PlanExecutor;
    pub use crate::kinds::{PgFunction, PgView, default_kinds};
    pub use crate::manifest::{EntityDecl, Manifest};
    pub use crate::operations::{MigrationOp, OpKind};
    pub use crate::resolver::{ResolvedOrder, resolve};
    pub use crate::sandbox::{Sandbox, TrialOutcome, trial};
    pub use crate::session::{PgSession, Row, Session};
}
