//! Views.

use crate::entity::{Entity, EntityKind, escape_literal, take_column};
use crate::error::Result;
use crate::session::Row;

/// A PostgreSQL view. The signature is the view name.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgView;

impl PgView {
    fn qualified_name(entity: &Entity) -> String {
        format!(
            "{}.\"{}\"",
            entity.literal_schema(),
            entity.signature().replace('"', "\"\"")
        )
    }

    fn catalog_filter(entity: &Entity) -> String {
        format!(
            "schemaname not in ('pg_catalog', 'information_schema') \
             and schemaname::text = '{}' \
             and viewname = '{}'",
            escape_literal(entity.schema()),
            escape_literal(entity.signature())
        )
    }
}

impl EntityKind for PgView {
    fn name(&self) -> &'static str {
        "view"
    }

    fn create_statement(&self, entity: &Entity) -> String {
        format!(
            "CREATE VIEW {} AS {}",
            Self::qualified_name(entity),
            entity.definition()
        )
    }

    fn drop_statement(&self, entity: &Entity) -> String {
        format!("DROP VIEW {}", Self::qualified_name(entity))
    }

    fn create_or_replace_statement(&self, entity: &Entity) -> String {
        format!(
            "CREATE OR REPLACE VIEW {} AS {}",
            Self::qualified_name(entity),
            entity.definition()
        )
    }

    fn identity_query(&self, entity: &Entity) -> String {
        format!(
            "select schemaname::text, viewname::text from pg_views where {}",
            Self::catalog_filter(entity)
        )
    }

    fn definition_query(&self, entity: &Entity) -> String {
        format!(
            "select schemaname::text, viewname::text, definition from pg_views where {}",
            Self::catalog_filter(entity)
        )
    }

    fn list_query(&self, schema_pattern: &str) -> String {
        format!(
            "select schemaname::text, viewname::text, definition \
             from pg_views \
             where schemaname not in ('pg_catalog', 'information_schema') \
             and schemaname::text like '{}' \
             order by schemaname, viewname",
            escape_literal(schema_pattern)
        )
    }

    fn from_row(&'static self, mut row: Row) -> Result<Entity> {
        let schema = take_column(self.name(), &mut row, 0)?;
        let name = take_column(self.name(), &mut row, 1)?;
        let definition = take_column(self.name(), &mut row, 2)?;
        Ok(Entity::new(self, schema, name, definition))
    }
}
