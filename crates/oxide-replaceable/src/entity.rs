//! Replaceable entities.
//!
//! An [`Entity`] is a declarative SQL object (a view, a function, ...) whose
//! whole body can be swapped with a "create or replace" statement. The SQL
//! needed to create, replace, drop, compare and list entities is provided by
//! its [`EntityKind`].

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{ReplaceError, Result};
use crate::session::{Row, Session};

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("Invalid whitespace regex"));

/// Collapses every run of whitespace into a single space and trims the ends.
#[must_use]
pub fn normalize_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

/// Strips surrounding whitespace and any trailing `;` terminators.
#[must_use]
pub fn strip_terminating_semicolon(sql: &str) -> String {
    sql.trim()
        .trim_end_matches(|c: char| c == ';' || c.is_whitespace())
        .to_string()
}

/// Escapes a value for embedding in a single-quoted SQL literal.
#[must_use]
pub fn escape_literal(value: &str) -> String {
    value.replace('\'', "''")
}

/// Escapes `LIKE` wildcards so that `value` only matches itself.
#[must_use]
pub fn escape_like(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// The capabilities of one kind of replaceable object.
///
/// Implementations are stateless and live for the whole program, which is
/// why entities hold them as `&'static dyn EntityKind`.
pub trait EntityKind: Send + Sync + 'static {
    /// Short lowercase name of the kind, e.g. `"view"`.
    fn name(&self) -> &'static str;

    /// Statement creating the entity, failing if it already exists.
    fn create_statement(&self, entity: &Entity) -> String;

    /// Statement dropping the entity.
    fn drop_statement(&self, entity: &Entity) -> String;

    /// Idempotent statement creating or replacing the entity.
    fn create_or_replace_statement(&self, entity: &Entity) -> String;

    /// Query returning one row that identifies the materialized entity.
    fn identity_query(&self, entity: &Entity) -> String;

    /// Query returning one row that captures the materialized entity's full
    /// behaviour as the server sees it.
    fn definition_query(&self, entity: &Entity) -> String;

    /// Query listing live entities of this kind whose schema matches the
    /// `LIKE` pattern.
    fn list_query(&self, schema_pattern: &str) -> String;

    /// Builds an entity from one row of [`EntityKind::list_query`].
    fn from_row(&'static self, row: Row) -> Result<Entity>;
}

/// A replaceable SQL object.
///
/// Entities are immutable value objects: two entities with the same kind,
/// schema, signature and definition are interchangeable.
#[derive(Clone)]
pub struct Entity {
    kind: &'static dyn EntityKind,
    schema: String,
    signature: String,
    definition: String,
}

impl Entity {
    /// Creates an entity, normalizing its schema, signature and definition.
    pub fn new(
        kind: &'static dyn EntityKind,
        schema: impl AsRef<str>,
        signature: impl AsRef<str>,
        definition: impl AsRef<str>,
    ) -> Self {
        Self {
            kind,
            schema: normalize_whitespace(schema.as_ref()),
            signature: normalize_whitespace(signature.as_ref()),
            definition: strip_terminating_semicolon(definition.as_ref()),
        }
    }

    /// Returns the entity kind.
    #[must_use]
    pub fn kind(&self) -> &'static dyn EntityKind {
        self.kind
    }

    /// Returns the kind name.
    #[must_use]
    pub fn kind_name(&self) -> &'static str {
        self.kind.name()
    }

    /// Returns the schema.
    #[must_use]
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Returns the signature (name plus argument profile).
    #[must_use]
    pub fn signature(&self) -> &str {
        &self.signature
    }

    /// Returns the definition.
    #[must_use]
    pub fn definition(&self) -> &str {
        &self.definition
    }

    /// Returns the `schema.signature` identity.
    #[must_use]
    pub fn identity(&self) -> String {
        format!("{}.{}", self.schema, self.signature)
    }

    /// Returns the schema as a quoted identifier.
    #[must_use]
    pub fn literal_schema(&self) -> String {
        format!("\"{}\"", self.schema.replace('"', "\"\""))
    }

    /// Returns a copy with a different definition.
    #[must_use]
    pub fn with_definition(&self, definition: impl AsRef<str>) -> Self {
        Self::new(self.kind, &self.schema, &self.signature, definition)
    }

    /// Returns whether both entities are of the same kind.
    #[must_use]
    pub fn same_kind(&self, other: &Self) -> bool {
        self.kind_name() == other.kind_name()
    }

    /// See [`EntityKind::create_statement`].
    #[must_use]
    pub fn to_create_statement(&self) -> String {
        self.kind.create_statement(self)
    }

    /// See [`EntityKind::drop_statement`].
    #[must_use]
    pub fn to_drop_statement(&self) -> String {
        self.kind.drop_statement(self)
    }

    /// See [`EntityKind::create_or_replace_statement`].
    #[must_use]
    pub fn to_create_or_replace_statement(&self) -> String {
        self.kind.create_or_replace_statement(self)
    }

    /// See [`EntityKind::identity_query`].
    #[must_use]
    pub fn identity_query(&self) -> String {
        self.kind.identity_query(self)
    }

    /// See [`EntityKind::definition_query`].
    #[must_use]
    pub fn definition_query(&self) -> String {
        self.kind.definition_query(self)
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("kind", &self.kind_name())
            .field("schema", &self.schema)
            .field("signature", &self.signature)
            .field("definition", &self.definition)
            .finish()
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind_name(), self.identity())
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.kind_name() == other.kind_name()
            && self.schema == other.schema
            && self.signature == other.signature
            && self.definition == other.definition
    }
}

impl Eq for Entity {}

impl Hash for Entity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind_name().hash(state);
        self.schema.hash(state);
        self.signature.hash(state);
        self.definition.hash(state);
    }
}

/// Lists the live entities of `kind` whose schema matches `schema_pattern`.
///
/// The pattern uses `LIKE` syntax, so `"%"` lists every schema.
pub async fn list_from_database(
    kind: &'static dyn EntityKind,
    session: &mut dyn Session,
    schema_pattern: &str,
) -> Result<Vec<Entity>> {
    let rows = session.fetch_all(&kind.list_query(schema_pattern)).await?;
    rows.into_iter().map(|row| kind.from_row(row)).collect()
}

/// Takes column `index` of a list row, failing on a missing column or NULL.
pub(crate) fn take_column(kind: &'static str, row: &mut Row, index: usize) -> Result<String> {
    row.get_mut(index)
        .and_then(Option::take)
        .ok_or_else(|| ReplaceError::MalformedRow {
            kind,
            message: format!("column {index} is missing or NULL"),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeKind, fake};

    #[test]
    fn test_normalize_whitespace() {
        assert_eq!(normalize_whitespace("  my\n\tfunc( a  int )  "), "my func( a int )");
    }

    #[test]
    fn test_strip_terminating_semicolon() {
        assert_eq!(strip_terminating_semicolon("select 1;;\n"), "select 1");
        assert_eq!(strip_terminating_semicolon("select ';' ; "), "select ';'");
    }

    #[test]
    fn test_entity_normalizes_fields() {
        let entity = Entity::new(&FakeKind, " public ", "to_upper ( text )", "select 1;");
        assert_eq!(entity.schema(), "public");
        assert_eq!(entity.signature(), "to_upper ( text )");
        assert_eq!(entity.definition(), "select 1");
        assert_eq!(entity.identity(), "public.to_upper ( text )");
        assert_eq!(entity.literal_schema(), "\"public\"");
    }

    #[test]
    fn test_entity_equality_is_by_value() {
        let a = fake("public", "v1", "select 1");
        let b = fake("public", "v1", "select 1;");
        let c = fake("public", "v1", "select 2");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.with_definition("select 2"), c);
    }

    #[test]
    fn test_display() {
        assert_eq!(fake("app", "v", "x").to_string(), "fake app.v");
    }

    #[test]
    fn test_escape_literal() {
        assert_eq!(escape_literal("o'neil"), "o''neil");
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("my_schema"), "my\\_schema");
        assert_eq!(escape_like("100%"), "100\\%");
        assert_eq!(escape_like("public"), "public");
    }

    #[test]
    fn test_take_column() {
        let mut row = vec![Some("a".to_string()), None];
        assert_eq!(take_column("fake", &mut row, 0).unwrap(), "a");
        assert!(matches!(
            take_column("fake", &mut row, 1),
            Err(ReplaceError::MalformedRow { .. })
        ));
        assert!(take_column("fake", &mut row, 5).is_err());
    }
}
