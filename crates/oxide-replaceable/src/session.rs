//! Database sessions.
//!
//! A [`Session`] is the only way the planner talks to a database. It offers
//! statement execution, single-row and multi-row queries, and a stack of
//! nested transaction scopes. Rows are returned as text so that comparables
//! stay independent of the wire protocol.

use futures::future::LocalBoxFuture;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Executor, Postgres, Row as _};
use tracing::debug;

/// A result row, one nullable text value per column.
pub type Row = Vec<Option<String>>;

/// A database handle with nested transaction scopes.
///
/// Nested scopes form a stack: [`Session::begin_nested`] pushes one and
/// [`Session::rollback_nested`] rolls back and pops the innermost.
/// [`Session::abandon_nested`] is the synchronous escape hatch used from
/// `Drop`: it marks the innermost scope for rollback, and the session must
/// perform that rollback before running anything else.
///
/// The returned futures are not `Send`; a session is driven by one task.
pub trait Session: Send {
    /// Executes a statement that returns no rows.
    fn execute<'a>(&'a mut self, sql: &'a str) -> LocalBoxFuture<'a, Result<(), sqlx::Error>>;

    /// Runs a query and returns its first row, if any.
    fn fetch_optional<'a>(
        &'a mut self,
        sql: &'a str,
    ) -> LocalBoxFuture<'a, Result<Option<Row>, sqlx::Error>>;

    /// Runs a query and returns every row.
    fn fetch_all<'a>(
        &'a mut self,
        sql: &'a str,
    ) -> LocalBoxFuture<'a, Result<Vec<Row>, sqlx::Error>>;

    /// Opens a nested transaction scope.
    fn begin_nested(&mut self) -> LocalBoxFuture<'_, Result<(), sqlx::Error>>;

    /// Rolls back and closes the innermost scope.
    fn rollback_nested(&mut self) -> LocalBoxFuture<'_, Result<(), sqlx::Error>>;

    /// Schedules a rollback of the innermost scope without waiting for it.
    fn abandon_nested(&mut self);
}

/// A [`Session`] over a pooled PostgreSQL connection.
///
/// The outermost scope is a real transaction (`BEGIN`/`ROLLBACK`); every
/// scope inside it is a savepoint.
pub struct PgSession {
    conn: PoolConnection<Postgres>,
    depth: usize,
    pending_rollbacks: usize,
}

impl PgSession {
    /// Acquires a connection from the pool.
    pub async fn acquire(pool: &PgPool) -> Result<Self, sqlx::Error> {
        Ok(Self::new(pool.acquire().await?))
    }

    /// Wraps an already acquired connection.
    #[must_use]
    pub fn new(conn: PoolConnection<Postgres>) -> Self {
        Self {
            conn,
            depth: 0,
            pending_rollbacks: 0,
        }
    }

    /// Returns the number of open scopes.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth - self.pending_rollbacks
    }

    fn savepoint_name(depth: usize) -> String {
        format!("oxide_replaceable_{depth}")
    }

    async fn rollback_innermost(&mut self) -> Result<(), sqlx::Error> {
        let sql = match self.depth {
            0 => return Ok(()),
            1 => "ROLLBACK".to_string(),
            depth => {
                let name = Self::savepoint_name(depth);
                format!("ROLLBACK TO SAVEPOINT {name}; RELEASE SAVEPOINT {name}")
            }
        };
        debug!(sql = %sql, depth = self.depth, "Closing transaction scope");
        // The scope is gone from our point of view even if the statement fails.
        self.depth -= 1;
        sqlx::raw_sql(&sql).execute(&mut *self.conn).await?;
        Ok(())
    }

    async fn flush_pending(&mut self) -> Result<(), sqlx::Error> {
        while self.pending_rollbacks > 0 {
            self.pending_rollbacks -= 1;
            self.rollback_innermost().await?;
        }
        Ok(())
    }

    fn decode(row: &PgRow) -> Result<Row, sqlx::Error> {
        // raw_sql uses the simple query protocol, so every value arrives as text.
        (0..row.len())
            .map(|index| row.try_get_unchecked::<Option<String>, _>(index))
            .collect()
    }
}

impl Session for PgSession {
    fn execute<'a>(&'a mut self, sql: &'a str) -> LocalBoxFuture<'a, Result<(), sqlx::Error>> {
        Box::pin(async move {
            self.flush_pending().await?;
            debug!(sql = %sql, "Executing SQL");
            sqlx::raw_sql(sql).execute(&mut *self.conn).await?;
            Ok(())
        })
    }

    fn fetch_optional<'a>(
        &'a mut self,
        sql: &'a str,
    ) -> LocalBoxFuture<'a, Result<Option<Row>, sqlx::Error>> {
        Box::pin(async move {
            self.flush_pending().await?;
            debug!(sql = %sql, "Fetching row");
            let row = Executor::fetch_optional(&mut *self.conn, sqlx::raw_sql(sql)).await?;
            row.as_ref().map(Self::decode).transpose()
        })
    }

    fn fetch_all<'a>(
        &'a mut self,
        sql: &'a str,
    ) -> LocalBoxFuture<'a, Result<Vec<Row>, sqlx::Error>> {
        Box::pin(async move {
            self.flush_pending().await?;
            debug!(sql = %sql, "Fetching rows");
            let rows = Executor::fetch_all(&mut *self.conn, sqlx::raw_sql(sql)).await?;
            rows.iter().map(Self::decode).collect()
        })
    }

    fn begin_nested(&mut self) -> LocalBoxFuture<'_, Result<(), sqlx::Error>> {
        Box::pin(async move {
            self.flush_pending().await?;
            let sql = if self.depth == 0 {
                "BEGIN".to_string()
            } else {
                format!("SAVEPOINT {}", Self::savepoint_name(self.depth + 1))
            };
            debug!(sql = %sql, depth = self.depth + 1, "Opening transaction scope");
            sqlx::raw_sql(&sql).execute(&mut *self.conn).await?;
            self.depth += 1;
            Ok(())
        })
    }

    fn rollback_nested(&mut self) -> LocalBoxFuture<'_, Result<(), sqlx::Error>> {
        Box::pin(async move {
            self.flush_pending().await?;
            self.rollback_innermost().await
        })
    }

    fn abandon_nested(&mut self) {
        if self.pending_rollbacks < self.depth {
            self.pending_rollbacks += 1;
        }
    }
}
