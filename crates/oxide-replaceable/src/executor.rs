//! Plan executor.
//!
//! This module applies a computed plan against a database.

use sqlx::postgres::PgPool;
use tracing::{debug, info};

use crate::error::Result;
use crate::operations::MigrationOp;

/// Applies migration plans to a database.
pub struct PlanExecutor {
    pool: PgPool,
    dry_run: bool,
}

impl PlanExecutor {
    /// Creates a new plan executor.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            dry_run: false,
        }
    }

    /// Enables dry-run mode (SQL is printed but not executed).
    #[must_use]
    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Returns whether dry-run mode is enabled.
    #[must_use]
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Returns the pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Returns the statement of each operation, in order.
    #[must_use]
    pub fn sql_for(ops: &[MigrationOp]) -> Vec<String> {
        ops.iter().map(MigrationOp::statement).collect()
    }

    /// Applies `ops` in order inside one transaction.
    ///
    /// Either every statement runs and the transaction commits, or the first
    /// failure rolls everything back.
    pub async fn apply(&self, ops: &[MigrationOp]) -> Result<()> {
        if ops.is_empty() {
            info!("Nothing to apply");
            return Ok(());
        }

        if self.dry_run {
            for sql in Self::sql_for(ops) {
                println!("{sql};");
            }
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for op in ops {
            info!(operation = %op, "Applying operation");
            let sql = op.statement();
            debug!(sql = %sql, "Executing SQL");
            sqlx::raw_sql(&sql).execute(&mut *tx).await?;
        }
        tx.commit().await?;

        info!(operations = ops.len(), "Plan applied");
        Ok(())
    }
}
