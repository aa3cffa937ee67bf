//! In-memory registry
//!
//! Suitable for development and testing. Desired state is set directly and
//! every artifact fetch is counted.

use crate::error::{RegistryError, Result};
use crate::registry::ModelRegistry;
use crate::tags::TagBook;
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use modelsync_types::{Artifact, Model, ModelVersion};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

/// Programmable in-memory registry
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    models: DashMap<String, Model>,
    artifacts: DashMap<ModelVersion, Artifact>,
    fetches: DashMap<ModelVersion, u64>,
    broken: DashSet<ModelVersion>,
    unavailable: AtomicBool,
    tags: TagBook,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole desired state
    pub fn set_models(&self, models: impl IntoIterator<Item = Model>) {
        self.models.clear();
        for model in models {
            self.upsert_model(model);
        }
    }

    pub fn upsert_model(&self, model: Model) {
        self.models.insert(model.name.clone(), model);
    }

    pub fn remove_model(&self, name: &str) -> Option<Model> {
        self.models.remove(name).map(|(_, model)| model)
    }

    /// Register the artifact returned for a version
    pub fn set_artifact(&self, model_name: &str, version_id: &str, path: impl Into<PathBuf>) {
        self.artifacts
            .insert(ModelVersion::new(model_name, version_id), Artifact::new(path));
    }

    /// Make fetches of one version fail until cleared
    pub fn break_artifact(&self, model_name: &str, version_id: &str) {
        self.broken.insert(ModelVersion::new(model_name, version_id));
    }

    pub fn repair_artifact(&self, model_name: &str, version_id: &str) {
        self.broken.remove(&ModelVersion::new(model_name, version_id));
    }

    /// Make `list_models` fail, as an unreachable registry would
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of times a version's artifact was fetched
    pub fn fetch_count(&self, model_name: &str, version_id: &str) -> u64 {
        self.fetches
            .get(&ModelVersion::new(model_name, version_id))
            .map(|count| *count)
            .unwrap_or(0)
    }

    pub fn tags(&self) -> &TagBook {
        &self.tags
    }
}

#[async_trait]
impl ModelRegistry for InMemoryRegistry {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list_models(&self) -> Result<Vec<Model>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RegistryError::Internal("registry unavailable".into()));
        }
        let mut models: Vec<Model> = self.models.iter().map(|m| m.value().clone()).collect();
        models.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(models)
    }

    async fn fetch_version_artifact(&self, model_name: &str, version_id: &str) -> Result<Artifact> {
        let version = ModelVersion::new(model_name, version_id);
        *self.fetches.entry(version.clone()).or_insert(0) += 1;

        if self.broken.contains(&version) {
            return Err(RegistryError::Packaging {
                model: model_name.to_string(),
                version: version_id.to_string(),
                reason: "artifact marked broken".into(),
            });
        }

        self.artifacts
            .get(&version)
            .map(|a| a.clone())
            .ok_or_else(|| RegistryError::VersionNotFound {
                model: model_name.to_string(),
                version: version_id.to_string(),
            })
    }

    async fn tag_deployed_models(&self, models: &[Model]) -> Result<()> {
        self.tags.tag_deployed(models);
        Ok(())
    }

    async fn reset_tags(&self) -> Result<()> {
        self.tags.reset();
        Ok(())
    }
}
