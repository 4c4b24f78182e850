//! Migration operations.
//!
//! Every operation wraps exactly one target [`Entity`]. Operations reverse
//! into each other so that a single plan yields both the upgrade and the
//! downgrade:
//!
//! | op        | reverse   | statement            |
//! |-----------|-----------|----------------------|
//! | `Create`  | `Drop`    | create               |
//! | `Drop`    | `Create`  | drop                 |
//! | `Replace` | `Revert`  | create or replace    |
//! | `Revert`  | (none)    | create or replace    |
//!
//! A `Revert` only appears in a generated downgrade. Its target carries the
//! definition that was live before the upgrade, not the declared one.

use std::fmt;

use crate::entity::Entity;
use crate::error::{ReplaceError, Result};

/// The four operation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// Create a new entity.
    Create,
    /// Replace the body of an existing entity.
    Replace,
    /// Drop an entity.
    Drop,
    /// Restore the body an entity had before a replace.
    Revert,
}

impl OpKind {
    /// Returns the lowercase name of the kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Replace => "replace",
            Self::Drop => "drop",
            Self::Revert => "revert",
        }
    }
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single migration operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MigrationOp {
    /// Create the target.
    Create(Entity),
    /// Replace the live body with the target's.
    Replace(Entity),
    /// Drop the target.
    Drop(Entity),
    /// Restore the target, which holds the previously live body.
    Revert(Entity),
}

impl MigrationOp {
    /// Returns the operation kind.
    #[must_use]
    pub fn kind(&self) -> OpKind {
        match self {
            Self::Create(_) => OpKind::Create,
            Self::Replace(_) => OpKind::Replace,
            Self::Drop(_) => OpKind::Drop,
            Self::Revert(_) => OpKind::Revert,
        }
    }

    /// Returns the target entity.
    #[must_use]
    pub fn target(&self) -> &Entity {
        match self {
            Self::Create(target)
            | Self::Replace(target)
            | Self::Drop(target)
            | Self::Revert(target) => target,
        }
    }

    /// Consumes the operation and returns its target.
    #[must_use]
    pub fn into_target(self) -> Entity {
        match self {
            Self::Create(target)
            | Self::Replace(target)
            | Self::Drop(target)
            | Self::Revert(target) => target,
        }
    }

    /// Returns the operation that undoes this one.
    ///
    /// A `Replace` reverses into a `Revert` of the same target; the caller
    /// generating a downgrade swaps in the previously live definition.
    /// Reversing a `Revert` is an error.
    pub fn reverse(&self) -> Result<MigrationOp> {
        match self {
            Self::Create(target) => Ok(Self::Drop(target.clone())),
            Self::Drop(target) => Ok(Self::Create(target.clone())),
            Self::Replace(target) => Ok(Self::Revert(target.clone())),
            Self::Revert(_) => Err(ReplaceError::NotReversible(self.to_string())),
        }
    }

    /// Returns whether [`MigrationOp::reverse`] succeeds.
    #[must_use]
    pub fn is_reversible(&self) -> bool {
        !matches!(self, Self::Revert(_))
    }

    /// Returns the SQL statement that performs the operation.
    #[must_use]
    pub fn statement(&self) -> String {
        match self {
            Self::Create(target) => target.to_create_statement(),
            Self::Drop(target) => target.to_drop_statement(),
            Self::Replace(target) | Self::Revert(target) => {
                target.to_create_or_replace_statement()
            }
        }
    }
}

impl fmt::Display for MigrationOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind(), self.target())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fake;

    #[test]
    fn test_create_drop_reverse_each_other() {
        let op = MigrationOp::Create(fake("public", "v1", "select 1"));

        let reverse = op.reverse().unwrap();
        assert_eq!(reverse.kind(), OpKind::Drop);
        assert_eq!(reverse.reverse().unwrap(), op);
    }

    #[test]
    fn test_replace_reverses_to_revert() {
        let target = fake("public", "v1", "select 1");
        let op = MigrationOp::Replace(target.clone());

        assert_eq!(op.reverse().unwrap(), MigrationOp::Revert(target));
    }

    #[test]
    fn test_revert_not_reversible() {
        let op = MigrationOp::Revert(fake("public", "v1", "select 1"));
        assert!(!op.is_reversible());
        assert!(matches!(op.reverse(), Err(ReplaceError::NotReversible(_))));
    }

    #[test]
    fn test_statements() {
        let target = fake("public", "v1", "select 1");

        assert_eq!(
            MigrationOp::Create(target.clone()).statement(),
            "CREATE public.v1 AS select 1"
        );
        assert_eq!(MigrationOp::Drop(target.clone()).statement(), "DROP public.v1");
        assert_eq!(
            MigrationOp::Replace(target.clone()).statement(),
            MigrationOp::Revert(target).statement()
        );
    }

    #[test]
    fn test_display() {
        let op = MigrationOp::Replace(fake("public", "v1", "select 1"));
        assert_eq!(op.to_string(), "replace fake public.v1");
        assert_eq!(op.into_target().signature(), "v1");
    }
}
