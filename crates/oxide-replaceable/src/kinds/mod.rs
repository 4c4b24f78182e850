//! PostgreSQL entity kinds.
//!
//! Each kind knows how to generate the statements and catalog queries for
//! one kind of replaceable object.

mod function;
mod view;

pub use function::PgFunction;
pub use view::PgView;

use crate::entity::EntityKind;
use crate::error::{ReplaceError, Result};

/// Returns every built-in kind, in listing order.
#[must_use]
pub fn default_kinds() -> Vec<&'static dyn EntityKind> {
    vec![&PgView, &PgFunction]
}

/// Looks up a kind by its name.
pub fn kind_by_name(
    kinds: &[&'static dyn EntityKind],
    name: &str,
) -> Result<&'static dyn EntityKind> {
    kinds
        .iter()
        .copied()
        .find(|kind| kind.name().eq_ignore_ascii_case(name.trim()))
        .ok_or_else(|| ReplaceError::UnknownKind(name.to_string()))
}
