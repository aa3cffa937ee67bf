//! Model registry trait
//!
//! The ModelRegistry is the source of desired state.

use crate::error::Result;
use async_trait::async_trait;
use modelsync_types::{Artifact, Model};

/// Source of desired stage bindings and version artifacts
#[async_trait]
pub trait ModelRegistry: Send + Sync {
    /// Registry kind, for logging
    fn name(&self) -> &str;

    /// Current desired bindings, one stage per registry label
    ///
    /// Archived versions are excluded and unlabelled versions are bound to
    /// [`modelsync_types::LATEST_STAGE`].
    async fn list_models(&self) -> Result<Vec<Model>>;

    /// Packaged artifact for one version
    ///
    /// Idempotent: an artifact that was already materialized is returned
    /// without fetching again.
    async fn fetch_version_artifact(&self, model_name: &str, version_id: &str) -> Result<Artifact>;

    /// Record which versions are deployed and where
    ///
    /// Observability only, never consulted when diffing.
    async fn tag_deployed_models(&self, _models: &[Model]) -> Result<()> {
        Ok(())
    }

    /// Remove every deployment tag
    async fn reset_tags(&self) -> Result<()> {
        Ok(())
    }
}
