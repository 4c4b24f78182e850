//! Functions.
//!
//! The signature is the name plus the full argument list, e.g.
//! `to_upper(some_text text)`, and the definition is everything that follows
//! it: `returns text as $$ select upper(some_text) $$ language sql`.
//!
//! Only plain functions (`prokind = 'f'`) are listed, and functions owned by
//! an extension are ignored. Overloads are told apart by their input
//! argument types.

use crate::entity::{Entity, EntityKind, escape_literal, take_column};
use crate::error::Result;
use crate::session::Row;

/// Functions installed by an extension, by oid.
const EXTENSION_FUNCTIONS: &str = "\
    with extension_functions as ( \
        select objid as extension_function_oid \
        from pg_depend \
        where deptype = 'e' and classid = 'pg_proc'::regclass \
    ) ";

const FROM_USER_FUNCTIONS: &str = "\
    from pg_proc p \
    join pg_namespace n on p.pronamespace = n.oid \
    left join extension_functions ef on p.oid = ef.extension_function_oid \
    where n.nspname not in ('pg_catalog', 'information_schema') \
    and p.prokind = 'f' \
    and ef.extension_function_oid is null";

/// A PostgreSQL function.
#[derive(Debug, Clone, Copy, Default)]
pub struct PgFunction;

impl PgFunction {
    /// Returns the function name, i.e. the signature up to the argument list.
    fn function_name(entity: &Entity) -> &str {
        let signature = entity.signature();
        signature
            .split_once('(')
            .map_or(signature, |(name, _)| name)
            .trim()
    }

    /// Returns the text between the outer parentheses of the signature.
    fn arguments(entity: &Entity) -> &str {
        entity
            .signature()
            .split_once('(')
            .and_then(|(_, rest)| rest.rsplit_once(')'))
            .map_or("", |(arguments, _)| arguments)
    }

    /// Returns the quoted, schema-qualified function name. Quoting keeps
    /// the name's case as declared.
    fn qualified_name(entity: &Entity) -> String {
        format!(
            "{}.\"{}\"",
            entity.literal_schema(),
            Self::function_name(entity).replace('"', "\"\"")
        )
    }

    /// Returns the argument list with `default` clauses removed, as accepted
    /// by `DROP FUNCTION`.
    fn drop_arguments(entity: &Entity) -> String {
        split_arguments(Self::arguments(entity))
            .into_iter()
            .map(strip_default)
            .filter(|argument| !argument.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Selects the one overload whose input argument types match the
    /// signature.
    fn overload_filter(entity: &Entity) -> String {
        let procedure = format!(
            "{}({})",
            Self::qualified_name(entity),
            input_types(Self::arguments(entity))
        );
        format!(
            " and n.nspname::text = '{}' and p.oid = to_regprocedure('{}')",
            escape_literal(entity.schema()),
            escape_literal(&procedure)
        )
    }
}

/// Splits an argument list on top-level commas.
fn split_arguments(arguments: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (index, c) in arguments.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(arguments[start..index].trim());
                start = index + 1;
            }
            _ => {}
        }
    }
    parts.push(arguments[start..].trim());
    parts
}

fn strip_default(argument: &str) -> &str {
    let lower = argument.to_ascii_lowercase();
    let cut = [" default ", "="]
        .iter()
        .filter_map(|marker| lower.find(marker))
        .min();
    match cut {
        Some(index) => argument[..index].trim(),
        None => argument.trim(),
    }
}

/// Splits off the first word of `text`, outside double quotes. Returns
/// `None` when `text` is a single word, or when what follows the first word
/// is a type modifier such as `(10, 2)` or `[]`.
fn split_word(text: &str) -> Option<(&str, &str)> {
    let text = text.trim();
    let mut quoted = false;

    for (index, c) in text.char_indices() {
        match c {
            '"' => quoted = !quoted,
            '(' | '[' if !quoted => return None,
            c if c.is_whitespace() && !quoted => {
                let rest = text[index..].trim_start();
                if rest.starts_with(['(', '[']) {
                    return None;
                }
                return Some((&text[..index], rest));
            }
            _ => {}
        }
    }
    None
}

/// Returns whether `first rest` starts a type name spelled with several
/// words, e.g. `double precision` or `timestamp with time zone`.
fn is_multiword_type(first: &str, rest: &str) -> bool {
    let next = rest
        .split(|c: char| c.is_whitespace() || c == '(' || c == '[')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();

    match first.to_ascii_lowercase().as_str() {
        "double" => next == "precision",
        "character" | "char" | "bit" => next == "varying",
        "national" => next == "character" || next == "char",
        "time" | "timestamp" => next == "with" || next == "without",
        "interval" => matches!(
            next.as_str(),
            "year" | "month" | "day" | "hour" | "minute" | "second"
        ),
        _ => false,
    }
}

/// Returns the type of one argument with its mode, name and default
/// removed, or `None` for an `OUT` argument.
fn input_type(argument: &str) -> Option<&str> {
    let mut rest = strip_default(argument);

    if let Some((first, tail)) = split_word(rest) {
        match first.to_ascii_lowercase().as_str() {
            "out" => return None,
            "in" | "inout" | "variadic" => rest = tail,
            _ => {}
        }
    }

    match split_word(rest) {
        Some((first, tail)) if !is_multiword_type(first, tail) => Some(tail),
        _ => Some(rest),
    }
}

/// Returns the input argument types of an argument list, as accepted by
/// `regprocedure`.
fn input_types(arguments: &str) -> String {
    split_arguments(arguments)
        .into_iter()
        .filter(|argument| !argument.is_empty())
        .filter_map(input_type)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Drops the `CREATE OR REPLACE FUNCTION ...` header line that
/// `pg_get_functiondef` puts before the body.
fn strip_header(functiondef: &str) -> &str {
    functiondef
        .trim_start()
        .split_once('\n')
        .map_or("", |(_, body)| body)
}

impl EntityKind for PgFunction {
    fn name(&self) -> &'static str {
        "function"
    }

    fn create_statement(&self, entity: &Entity) -> String {
        format!(
            "CREATE FUNCTION {}({}) {}",
            Self::qualified_name(entity),
            Self::arguments(entity),
            entity.definition()
        )
    }

    fn drop_statement(&self, entity: &Entity) -> String {
        format!(
            "DROP FUNCTION {}({})",
            Self::qualified_name(entity),
            Self::drop_arguments(entity)
        )
    }

    fn create_or_replace_statement(&self, entity: &Entity) -> String {
        format!(
            "CREATE OR REPLACE FUNCTION {}({}) {}",
            Self::qualified_name(entity),
            Self::arguments(entity),
            entity.definition()
        )
    }

    fn identity_query(&self, entity: &Entity) -> String {
        format!(
            "{EXTENSION_FUNCTIONS}\
             select n.nspname::text, p.proname::text, \
             pg_get_function_identity_arguments(p.oid) \
             {FROM_USER_FUNCTIONS}{}",
            Self::overload_filter(entity)
        )
    }

    fn definition_query(&self, entity: &Entity) -> String {
        format!(
            "{EXTENSION_FUNCTIONS}\
             select n.nspname::text, p.proname::text, \
             pg_get_function_identity_arguments(p.oid), pg_get_functiondef(p.oid) \
             {FROM_USER_FUNCTIONS}{}",
            Self::overload_filter(entity)
        )
    }

    fn list_query(&self, schema_pattern: &str) -> String {
        format!(
            "{EXTENSION_FUNCTIONS}\
             select n.nspname::text, \
             p.proname::text || '(' || pg_get_function_arguments(p.oid) || ')', \
             pg_get_functiondef(p.oid) \
             {FROM_USER_FUNCTIONS} \
             and n.nspname::text like '{}' \
             order by n.nspname, p.proname",
            escape_literal(schema_pattern)
        )
    }

    fn from_row(&'static self, mut row: Row) -> Result<Entity> {
        let schema = take_column(self.name(), &mut row, 0)?;
        let signature = take_column(self.name(), &mut row, 1)?;
        let functiondef = take_column(self.name(), &mut row, 2)?;
        Ok(Entity::new(self, schema, signature, strip_header(&functiondef)))
    }
}
