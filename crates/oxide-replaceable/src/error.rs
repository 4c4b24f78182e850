//! Error types for plan computation.

use std::path::PathBuf;

/// Errors that can occur while computing or executing a plan.
#[derive(Debug, thiserror::Error)]
pub enum ReplaceError {
    /// Two declared entities share a `schema.signature` identity.
    #[error("Entity with identity '{identity}' was registered multiple times")]
    DuplicateIdentity {
        /// The shared identity.
        identity: String,
    },

    /// A create-or-replace statement failed inside a sandbox.
    #[error("Failed to materialize entity '{entity}': {source}")]
    Materialization {
        /// Identity of the entity that could not be created.
        entity: String,
        /// The database error raised by the statement.
        #[source]
        source: sqlx::Error,
    },

    /// An entity could not be placed in a dependency order.
    ///
    /// Either the entity is part of a dependency cycle or its definition is
    /// invalid SQL. The named entity is a candidate; the root cause may span
    /// several entities.
    #[error("Failed to simulate entity '{entity}': {source}")]
    SimulationFailure {
        /// Identity of the entity that could not be placed.
        entity: String,
        /// The error from the final validation attempt.
        #[source]
        source: sqlx::Error,
    },

    /// The dependency resolver produced an order that later stages disagree with.
    #[error("Internal consistency fault: {0}")]
    InternalConsistency(String),

    /// A replaced entity has no live counterpart to revert to.
    #[error("No live definition found for entity '{entity}'")]
    MissingLiveDefinition {
        /// Identity of the entity.
        entity: String,
    },

    /// A compare query returned no row.
    #[error("{comparison} query for entity '{entity}' returned no row")]
    ComparableNotFound {
        /// Identity of the entity.
        entity: String,
        /// Which comparison was requested.
        comparison: &'static str,
    },

    /// A list query returned a row of unexpected shape.
    #[error("Malformed {kind} row: {message}")]
    MalformedRow {
        /// Entity kind that produced the row.
        kind: &'static str,
        /// What was wrong with it.
        message: String,
    },

    /// An operation cannot be reversed.
    #[error("Operation '{0}' is not reversible")]
    NotReversible(String),

    /// A manifest names an entity kind that is not registered.
    #[error("Unknown entity kind '{0}'")]
    UnknownKind(String),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// IO error (reading manifests).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse a manifest file.
    #[error("Failed to parse manifest '{path}': {source}")]
    Manifest {
        /// Path to the manifest.
        path: PathBuf,
        /// The JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for plan operations.
pub type Result<T> = std::result::Result<T, ReplaceError>;
