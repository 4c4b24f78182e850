//! In-memory session used by unit tests.
//!
//! `FakeSession` simulates a tiny catalog of objects keyed by
//! `(schema, name)`. Statements are produced by `FakeKind`:
//!
//! - `UPSERT s.n AS body` creates or replaces an object,
//! - `CREATE s.n AS body` creates one and fails if it exists,
//! - `DROP s.n` removes one.
//!
//! A body token of the form `@s.n` is a reference; creating an object whose
//! references do not exist fails, which is how dependencies are simulated.
//! Definition comparables are lowercased and whitespace-collapsed, standing
//! in for the server's canonical form. Rejected statements fail with
//! `sqlx::Error::Database`, the way the server reports them.

use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};

use futures::future::LocalBoxFuture;

use crate::entity::{Entity, EntityKind, escape_like, normalize_whitespace, take_column};
use crate::error::Result;
use crate::operations::MigrationOp;
use crate::session::{Row, Session};

type Catalog = BTreeMap<(String, String), String>;

/// Entity kind emitting `FakeSession` statements.
pub(crate) struct FakeKind;

impl EntityKind for FakeKind {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn create_statement(&self, entity: &Entity) -> String {
        format!("CREATE {} AS {}", entity.identity(), entity.definition())
    }

    fn drop_statement(&self, entity: &Entity) -> String {
        format!("DROP {}", entity.identity())
    }

    fn create_or_replace_statement(&self, entity: &Entity) -> String {
        format!("UPSERT {} AS {}", entity.identity(), entity.definition())
    }

    fn identity_query(&self, entity: &Entity) -> String {
        format!("IDENTITY {}", entity.identity())
    }

    fn definition_query(&self, entity: &Entity) -> String {
        format!("DEFINITION {}", entity.identity())
    }

    fn list_query(&self, schema_pattern: &str) -> String {
        format!("LIST {schema_pattern}")
    }

    fn from_row(&'static self, mut row: Row) -> Result<Entity> {
        let schema = take_column(self.name(), &mut row, 0)?;
        let name = take_column(self.name(), &mut row, 1)?;
        let body = take_column(self.name(), &mut row, 2)?;
        Ok(Entity::new(self, schema, name, body))
    }
}

/// Builds a `FakeKind` entity.
pub(crate) fn fake(schema: &str, name: &str, definition: &str) -> Entity {
    Entity::new(&FakeKind, schema, name, definition)
}

/// Call counters.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Stats {
    /// Every call made to the session.
    pub statements: usize,
    /// Calls to `begin_nested`.
    pub nested_begins: usize,
}

/// A simulated database.
#[derive(Debug, Default)]
pub(crate) struct FakeSession {
    catalog: Catalog,
    snapshots: Vec<Catalog>,
    pending: usize,
    hidden: BTreeSet<(String, String)>,
    stats: Stats,
    remaining: Option<usize>,
}

/// A statement rejected by the simulated server.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct FakeDbError(String);

impl sqlx::error::DatabaseError for FakeDbError {
    fn message(&self) -> &str {
        &self.0
    }

    fn code(&self) -> Option<Cow<'_, str>> {
        Some(Cow::Borrowed("XX000"))
    }

    fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        self
    }

    fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
        self
    }

    fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
        self
    }

    fn kind(&self) -> sqlx::error::ErrorKind {
        sqlx::error::ErrorKind::Other
    }
}

fn error(message: impl Into<String>) -> sqlx::Error {
    sqlx::Error::Database(Box::new(FakeDbError(message.into())))
}

fn split_target(target: &str) -> std::result::Result<(String, String), sqlx::Error> {
    target
        .split_once('.')
        .map(|(schema, name)| (schema.to_string(), name.to_string()))
        .ok_or_else(|| error(format!("invalid target '{target}'")))
}

impl FakeSession {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Creates a live object outside any transaction.
    pub(crate) fn seed(&mut self, schema: &str, name: &str, body: &str) {
        self.catalog
            .insert((schema.to_string(), name.to_string()), body.to_string());
    }

    /// Makes the identity query for `schema.name` return no row.
    pub(crate) fn hide(&mut self, schema: &str, name: &str) {
        self.hidden.insert((schema.to_string(), name.to_string()));
    }

    /// Lets `statements` more calls through, then fails the next one with an
    /// I/O error, as a dropped connection would.
    pub(crate) fn interrupt_after(&mut self, statements: usize) {
        self.remaining = Some(statements);
    }

    pub(crate) fn contains(&self, schema: &str, name: &str) -> bool {
        self.catalog
            .contains_key(&(schema.to_string(), name.to_string()))
    }

    pub(crate) fn body(&self, schema: &str, name: &str) -> Option<&str> {
        self.catalog
            .get(&(schema.to_string(), name.to_string()))
            .map(String::as_str)
    }

    pub(crate) fn depth(&self) -> usize {
        self.snapshots.len() - self.pending
    }

    pub(crate) fn pending_rollbacks(&self) -> usize {
        self.pending
    }

    pub(crate) fn stats(&self) -> Stats {
        self.stats
    }

    /// Runs each op's statement outside any transaction.
    pub(crate) async fn apply(&mut self, ops: &[MigrationOp]) {
        for op in ops {
            self.execute(&op.statement())
                .await
                .unwrap_or_else(|e| panic!("failed to apply {op}: {e}"));
        }
    }

    /// Bookkeeping shared by every statement.
    fn start(&mut self) -> std::result::Result<(), sqlx::Error> {
        match self.remaining {
            Some(0) => {
                self.remaining = None;
                return Err(sqlx::Error::Io(std::io::Error::from(
                    std::io::ErrorKind::ConnectionReset,
                )));
            }
            Some(ref mut n) => *n -= 1,
            None => {}
        }
        self.flush();
        self.stats.statements += 1;
        Ok(())
    }

    fn flush(&mut self) {
        while self.pending > 0 {
            self.pending -= 1;
            if let Some(snapshot) = self.snapshots.pop() {
                self.catalog = snapshot;
            }
        }
    }

    fn materialize(
        &mut self,
        rest: &str,
        replace: bool,
    ) -> std::result::Result<(), sqlx::Error> {
        let (target, body) = rest
            .split_once(" AS ")
            .ok_or_else(|| error(format!("missing body in '{rest}'")))?;
        let key = split_target(target)?;

        for token in body.split_whitespace() {
            if let Some(reference) = token.strip_prefix('@') {
                let reference = reference.trim_end_matches([',', ')', ';']);
                if !self.catalog.contains_key(&split_target(reference)?) {
                    return Err(error(format!("relation '{reference}' does not exist")));
                }
            }
        }
        if !replace && self.catalog.contains_key(&key) {
            return Err(error(format!("'{target}' already exists")));
        }

        self.catalog.insert(key, body.to_string());
        Ok(())
    }

    fn run(&mut self, sql: &str) -> std::result::Result<(), sqlx::Error> {
        match sql.split_once(' ') {
            Some(("UPSERT", rest)) => self.materialize(rest, true),
            Some(("CREATE", rest)) => self.materialize(rest, false),
            Some(("DROP", target)) => match self.catalog.remove(&split_target(target)?) {
                Some(_) => Ok(()),
                None => Err(error(format!("'{target}' does not exist"))),
            },
            _ => Err(error(format!("syntax error in '{sql}'"))),
        }
    }

    fn query_one(&self, sql: &str) -> std::result::Result<Option<Row>, sqlx::Error> {
        let (verb, target) = sql
            .split_once(' ')
            .ok_or_else(|| error(format!("syntax error in '{sql}'")))?;
        let key = split_target(target)?;
        if self.hidden.contains(&key) {
            return Ok(None);
        }
        let Some(body) = self.catalog.get(&key) else {
            return Ok(None);
        };

        let (schema, name) = key;
        match verb {
            "IDENTITY" => Ok(Some(vec![Some(schema), Some(name)])),
            "DEFINITION" => Ok(Some(vec![
                Some(schema),
                Some(name),
                Some(normalize_whitespace(&body.to_lowercase())),
            ])),
            _ => Err(error(format!("syntax error in '{sql}'"))),
        }
    }

    fn query_all(&self, sql: &str) -> std::result::Result<Vec<Row>, sqlx::Error> {
        let pattern = sql
            .strip_prefix("LIST ")
            .ok_or_else(|| error(format!("syntax error in '{sql}'")))?;

        Ok(self
            .catalog
            .iter()
            .filter(|((schema, _), _)| pattern == "%" || escape_like(schema) == pattern)
            .map(|((schema, name), body)| {
                vec![
                    Some(schema.clone()),
                    Some(name.clone()),
                    Some(body.clone()),
                ]
            })
            .collect())
    }
}

impl Session for FakeSession {
    fn execute<'a>(
        &'a mut self,
        sql: &'a str,
    ) -> LocalBoxFuture<'a, std::result::Result<(), sqlx::Error>> {
        Box::pin(async move {
            self.start()?;
            self.run(sql)
        })
    }

    fn fetch_optional<'a>(
        &'a mut self,
        sql: &'a str,
    ) -> LocalBoxFuture<'a, std::result::Result<Option<Row>, sqlx::Error>> {
        Box::pin(async move {
            self.start()?;
            self.query_one(sql)
        })
    }

    fn fetch_all<'a>(
        &'a mut self,
        sql: &'a str,
    ) -> LocalBoxFuture<'a, std::result::Result<Vec<Row>, sqlx::Error>> {
        Box::pin(async move {
            self.start()?;
            self.query_all(sql)
        })
    }

    fn begin_nested(&mut self) -> LocalBoxFuture<'_, std::result::Result<(), sqlx::Error>> {
        Box::pin(async move {
            self.start()?;
            self.stats.nested_begins += 1;
            self.snapshots.push(self.catalog.clone());
            Ok(())
        })
    }

    fn rollback_nested(&mut self) -> LocalBoxFuture<'_, std::result::Result<(), sqlx::Error>> {
        Box::pin(async move {
            self.start()?;
            let snapshot = self
                .snapshots
                .pop()
                .ok_or_else(|| error("no transaction in progress"))?;
            self.catalog = snapshot;
            Ok(())
        })
    }

    fn abandon_nested(&mut self) {
        if self.pending < self.snapshots.len() {
            self.pending += 1;
        }
    }
}
