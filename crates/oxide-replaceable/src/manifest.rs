//! JSON manifests of declared entities.
//!
//! ```json
//! {
//!   "schemas": ["reporting"],
//!   "exclude_schemas": ["audit"],
//!   "entities": [
//!     {
//!       "kind": "view",
//!       "schema": "public",
//!       "signature": "active_users",
//!       "definition": "select * from users where active"
//!     }
//!   ]
//! }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::diff::PlanOptions;
use crate::entity::{Entity, EntityKind};
use crate::error::{ReplaceError, Result};
use crate::kinds::kind_by_name;

/// One declared entity, as written in a manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDecl {
    /// Kind name, e.g. `"view"` or `"function"`.
    pub kind: String,
    /// Schema the entity lives in.
    pub schema: String,
    /// Name plus argument profile.
    pub signature: String,
    /// SQL body.
    pub definition: String,
}

impl From<&Entity> for EntityDecl {
    fn from(entity: &Entity) -> Self {
        Self {
            kind: entity.kind_name().to_string(),
            schema: entity.schema().to_string(),
            signature: entity.signature().to_string(),
            definition: entity.definition().to_string(),
        }
    }
}

/// Declared entities plus the options to plan them with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// The declared entities.
    #[serde(default)]
    pub entities: Vec<EntityDecl>,
    /// Schema options.
    #[serde(flatten)]
    pub options: PlanOptions,
}

impl Manifest {
    /// Reads a manifest from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let manifest: Self =
            serde_json::from_str(&content).map_err(|source| ReplaceError::Manifest {
                path: path.to_path_buf(),
                source,
            })?;
        debug!(
            path = %path.display(),
            entities = manifest.entities.len(),
            "Loaded manifest"
        );
        Ok(manifest)
    }

    /// Serializes the manifest as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Builds the declared entities, resolving kind names against `kinds`.
    pub fn entities(&self, kinds: &[&'static dyn EntityKind]) -> Result<Vec<Entity>> {
        self.entities
            .iter()
            .map(|decl| -> Result<Entity> {
                let kind = kind_by_name(kinds, &decl.kind)?;
                Ok(Entity::new(kind, &decl.schema, &decl.signature, &decl.definition))
            })
            .collect()
    }
}
