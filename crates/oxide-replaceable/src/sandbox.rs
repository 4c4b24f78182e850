//! Rollback-only transaction scopes.
//!
//! A [`Sandbox`] opens a nested transaction, materializes a list of entities
//! with their create-or-replace statements and hands the session to the
//! caller. It never commits: [`Sandbox::rollback`] closes it explicitly, and
//! dropping an open sandbox schedules the rollback on the session.

use tracing::debug;

use crate::entity::Entity;
use crate::error::{ReplaceError, Result};
use crate::session::Session;

/// A nested transaction scope that is always rolled back.
pub struct Sandbox<'s> {
    session: &'s mut dyn Session,
    open: bool,
}

impl<'s> Sandbox<'s> {
    /// Opens a nested transaction and creates `entities` inside it, in order.
    ///
    /// If the database rejects a statement, the scope is rolled back and
    /// [`ReplaceError::Materialization`] names the entity that failed. Any
    /// other failure (lost connection, I/O) is returned as
    /// [`ReplaceError::Database`] and the rollback is left to `Drop`.
    pub async fn enter(session: &'s mut dyn Session, entities: &[Entity]) -> Result<Self> {
        session.begin_nested().await?;
        let sandbox = Self {
            session,
            open: true,
        };

        for entity in entities {
            let sql = entity.to_create_or_replace_statement();
            match sandbox.session.execute(&sql).await {
                Ok(()) => {}
                Err(source @ sqlx::Error::Database(_)) => {
                    debug!(entity = %entity, error = %source, "Materialization failed");
                    sandbox.rollback().await?;
                    return Err(ReplaceError::Materialization {
                        entity: entity.identity(),
                        source,
                    });
                }
                Err(source) => return Err(ReplaceError::Database(source)),
            }
        }

        Ok(sandbox)
    }

    /// Returns the session, with every sandboxed entity materialized.
    pub fn session(&mut self) -> &mut dyn Session {
        &mut *self.session
    }

    /// Rolls back the scope.
    pub async fn rollback(mut self) -> Result<()> {
        self.open = false;
        self.session.rollback_nested().await?;
        Ok(())
    }
}

impl Drop for Sandbox<'_> {
    fn drop(&mut self) {
        if self.open {
            self.session.abandon_nested();
        }
    }
}

/// Outcome of a sandboxed trial materialization.
#[derive(Debug)]
pub enum TrialOutcome {
    /// Every entity was created.
    Materialized,
    /// An entity could not be created.
    Failed {
        /// Identity of the entity whose statement failed.
        entity: String,
        /// The database error.
        error: sqlx::Error,
    },
}

impl TrialOutcome {
    /// Returns whether the trial succeeded.
    #[must_use]
    pub fn is_materialized(&self) -> bool {
        matches!(self, Self::Materialized)
    }
}

/// Tries to create `entities` in order, leaving no trace in the database.
///
/// Statement failures are reported as [`TrialOutcome::Failed`]; any other
/// error (e.g. the scope could not be opened) is returned as `Err`.
pub async fn trial(session: &mut dyn Session, entities: &[Entity]) -> Result<TrialOutcome> {
    match Sandbox::enter(session, entities).await {
        Ok(sandbox) => {
            sandbox.rollback().await?;
            Ok(TrialOutcome::Materialized)
        }
        Err(ReplaceError::Materialization { entity, source }) => Ok(TrialOutcome::Failed {
            entity,
            error: source,
        }),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeSession, fake};

    #[tokio::test]
    async fn test_sandbox_rolls_back() {
        let mut session = FakeSession::new();
        let view = fake("public", "v1", "select 1");

        let mut sandbox = Sandbox::enter(&mut session, &[view]).await.unwrap();
        let row = sandbox
            .session()
            .fetch_optional("IDENTITY public.v1")
            .await
            .unwrap();
        assert!(row.is_some());
        sandbox.rollback().await.unwrap();

        assert!(!session.contains("public", "v1"));
        assert_eq!(session.depth(), 0);
    }

    #[tokio::test]
    async fn test_materialization_failure_is_distinguishable() {
        let mut session = FakeSession::new();
        let entities = [
            fake("public", "a", "select 1"),
            fake("public", "b", "select * from @public.missing"),
        ];

        let result = Sandbox::enter(&mut session, &entities).await;
        match &result {
            Err(ReplaceError::Materialization { entity, .. }) => assert_eq!(entity, "public.b"),
            Err(other) => panic!("Expected Materialization, got {other:?}"),
            Ok(_) => panic!("Expected Materialization, got a sandbox"),
        }
        drop(result);
        assert!(!session.contains("public", "a"));
        assert_eq!(session.depth(), 0);
    }

    #[tokio::test]
    async fn test_lost_connection_is_not_a_materialization_failure() {
        let mut session = FakeSession::new();
        // BEGIN and the first create succeed, the second create does not.
        session.interrupt_after(2);
        let entities = [fake("public", "a", "select 1"), fake("public", "b", "select 2")];

        let result = Sandbox::enter(&mut session, &entities).await;
        assert!(
            matches!(result, Err(ReplaceError::Database(sqlx::Error::Io(_)))),
            "Expected a Database error, got {:?}",
            result.as_ref().err()
        );
        drop(result);
        assert_eq!(session.pending_rollbacks(), 1);

        let outcome = trial(&mut session, &[fake("public", "c", "select 3")]).await.unwrap();
        assert!(outcome.is_materialized());
        assert_eq!(session.depth(), 0);
        assert!(!session.contains("public", "a"));
    }

    #[tokio::test]
    async fn test_dropped_sandbox_rolls_back_before_next_statement() {
        let mut session = FakeSession::new();

        {
            let _sandbox = Sandbox::enter(&mut session, &[fake("public", "v1", "select 1")])
                .await
                .unwrap();
        }
        assert_eq!(session.pending_rollbacks(), 1);

        session.execute("UPSERT public.v2 AS select 2").await.unwrap();
        assert_eq!(session.pending_rollbacks(), 0);
        assert_eq!(session.depth(), 0);
        assert!(!session.contains("public", "v1"));
        assert!(session.contains("public", "v2"));
    }

    #[tokio::test]
    async fn test_trial_outcomes() {
        let mut session = FakeSession::new();
        session.seed("public", "base", "select 1");

        let ok = trial(&mut session, &[fake("public", "v", "select * from @public.base")])
            .await
            .unwrap();
        assert!(ok.is_materialized());

        let failed = trial(&mut session, &[fake("public", "w", "select * from @public.nope")])
            .await
            .unwrap();
        match failed {
            TrialOutcome::Failed { entity, .. } => assert_eq!(entity, "public.w"),
            TrialOutcome::Materialized => panic!("Expected Failed"),
        }
        assert_eq!(session.depth(), 0);
        assert!(!session.contains("public", "v"));
    }
}
