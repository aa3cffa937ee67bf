//! Manifest-backed registry
//!
//! Desired state is declared in a YAML (or JSON) file that is re-read on
//! every call, so edits are picked up on the next reconciliation tick:
//!
//! ```yaml
//! models:
//!   - name: churn
//!     versions:
//!       - version: "3"
//!         stage: Production
//!         source: churn/3          # relative to the manifest
//!       - version: "4"             # no stage: bound to "Latest"
//!         source: churn/4
//!       - version: "2"
//!         stage: Archived          # never deployed
//!         source: churn/2
//! ```

use crate::cache::ArtifactCache;
use crate::error::{RegistryError, Result};
use crate::registry::ModelRegistry;
use crate::tags::TagBook;
use async_trait::async_trait;
use modelsync_types::{Artifact, Model, ModelEndpoint, ModelVersion, ARCHIVED_STAGE, LATEST_STAGE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

/// Parsed manifest file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub models: Vec<ManifestEntry>,
}

/// One registered model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub name: String,
    #[serde(default)]
    pub versions: Vec<ManifestVersion>,
}

/// One registered version and the stages it is labelled with
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestVersion {
    pub version: String,

    /// Single stage label; `None` or absent means unlabelled
    #[serde(default)]
    pub stage: Option<String>,

    /// Additional stage labels
    #[serde(default)]
    pub stages: Vec<String>,

    /// Packaged file or model directory, relative to the manifest
    pub source: PathBuf,
}

impl ManifestVersion {
    /// Effective stage labels, archived ones included
    pub fn labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self
            .stage
            .iter()
            .chain(self.stages.iter())
            .filter(|s| !s.is_empty() && s.as_str() != "None")
            .cloned()
            .collect();
        if labels.is_empty() {
            labels.push(LATEST_STAGE.to_string());
        }
        labels.dedup();
        labels
    }

    /// Archived versions are never deployed, whatever else they are labelled
    pub fn is_archived(&self) -> bool {
        self.labels().iter().any(|label| label == ARCHIVED_STAGE)
    }
}

impl Manifest {
    pub fn parse(path: &Path, raw: &str) -> Result<Self> {
        serde_yaml::from_str(raw).map_err(|e| RegistryError::InvalidManifest {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Desired models, archived versions dropped
    pub fn models(&self) -> Vec<Model> {
        self.models
            .iter()
            .map(|entry| {
                let mut model = Model::new(&entry.name);
                for version in &entry.versions {
                    if version.is_archived() {
                        continue;
                    }
                    for stage in version.labels() {
                        let id = ModelVersion::new(&entry.name, &version.version);
                        model.bind(stage, ModelEndpoint::new(id));
                    }
                }
                model
            })
            .collect()
    }

    pub fn find(&self, model_name: &str, version_id: &str) -> Option<&ManifestVersion> {
        self.models
            .iter()
            .filter(|entry| entry.name == model_name)
            .flat_map(|entry| entry.versions.iter())
            .find(|v| v.version == version_id)
    }
}

/// Registry reading desired state from a manifest file
pub struct ManifestRegistry {
    path: PathBuf,
    cache: ArtifactCache,
    tags: TagBook,
}

impl ManifestRegistry {
    pub fn new(path: impl Into<PathBuf>, cache: ArtifactCache) -> Self {
        let path = path.into();
        info!(manifest = %path.display(), cache = %cache.root().display(), "Manifest registry initialized");
        Self {
            path,
            cache,
            tags: TagBook::new(),
        }
    }

    pub fn tags(&self) -> &TagBook {
        &self.tags
    }

    async fn load(&self) -> Result<Manifest> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| RegistryError::io(&self.path, e))?;
        Manifest::parse(&self.path, &raw)
    }

    fn resolve(&self, source: &Path) -> PathBuf {
        if source.is_absolute() {
            return source.to_path_buf();
        }
        self.path
            .parent()
            .map(|dir| dir.join(source))
            .unwrap_or_else(|| source.to_path_buf())
    }
}

#[async_trait]
impl ModelRegistry for ManifestRegistry {
    fn name(&self) -> &str {
        "manifest"
    }

    async fn list_models(&self) -> Result<Vec<Model>> {
        let models = self.load().await?.models();
        debug!(count = models.len(), "Listed manifest models");
        Ok(models)
    }

    #[instrument(skip(self), fields(manifest = %self.path.display()))]
    async fn fetch_version_artifact(&self, model_name: &str, version_id: &str) -> Result<Artifact> {
        if let Some(artifact) = self.cache.cached(model_name, version_id).await {
            return Ok(artifact);
        }

        let manifest = self.load().await?;
        let version = manifest
            .find(model_name, version_id)
            .ok_or_else(|| RegistryError::VersionNotFound {
                model: model_name.to_string(),
                version: version_id.to_string(),
            })?;
        let source = self.resolve(&version.source);

        self.cache
            .get_or_package(model_name, version_id, &source)
            .await
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

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
models:
  - name: churn
    versions:
      - version: "3"
        stage: Production
        source: churn/3
      - version: "4"
        source: churn/4
      - version: "5"
        stage: None
        stages: [Staging]
        source: churn/5
      - version: "2"
        stage: Archived
        source: churn/2
  - name: fraud
    versions:
      - version: "1"
        stages: [Production, Staging]
        source: fraud.tar.gz
"#;

    #[test]
    fn test_models_from_manifest() {
        let manifest = Manifest::parse(Path::new("m.yaml"), MANIFEST).unwrap();
        let models = manifest.models();
        assert_eq!(models.len(), 2);

        let churn = &models[0];
        let prod: Vec<_> = churn.stage("Production").unwrap().iter().map(|e| e.version_id()).collect();
        assert_eq!(prod, vec!["3"]);
        let latest: Vec<_> = churn.stage(LATEST_STAGE).unwrap().iter().map(|e| e.version_id()).collect();
        assert_eq!(latest, vec!["4"]);
        assert!(churn.stage("Staging").unwrap().contains(&ModelVersion::new("churn", "5")));
        assert!(churn.stage(ARCHIVED_STAGE).is_none());
        assert!(!churn.unique_versions().contains(&ModelVersion::new("churn", "2")));

        let fraud = &models[1];
        assert_eq!(fraud.versions.len(), 2);
        assert_eq!(fraud.unique_versions().len(), 1);
    }

    #[test]
    fn test_archived_version_is_dropped_from_every_stage() {
        let raw = r#"
models:
  - name: churn
    versions:
      - version: "2"
        stage: Archived
        stages: [Production]
        source: churn/2
      - version: "3"
        stages: [Production, Archived]
        source: churn/3
      - version: "4"
        stage: Production
        source: churn/4
"#;
        let models = Manifest::parse(Path::new("m.yaml"), raw).unwrap().models();
        let versions = models[0].unique_versions();
        assert_eq!(versions.len(), 1);
        assert!(versions.contains(&ModelVersion::new("churn", "4")));
    }

    #[test]
    fn test_invalid_manifest() {
        let err = Manifest::parse(Path::new("bad.yaml"), "models: [ {name: 1").unwrap_err();
        assert!(matches!(err, RegistryError::InvalidManifest { .. }));
    }

    #[test]
    fn test_json_manifest() {
        let raw = r#"{"models":[{"name":"m1","versions":[{"version":"1","stage":"Prod","source":"a"}]}]}"#;
        let models = Manifest::parse(Path::new("m.json"), raw).unwrap().models();
        assert!(models[0].stage("Prod").is_some());
    }

    #[tokio::test]
    async fn test_fetch_resolves_relative_source() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fraud.tar.gz"), b"pkg").unwrap();
        let manifest_path = dir.path().join("models.yaml");
        std::fs::write(&manifest_path, MANIFEST).unwrap();

        let cache = ArtifactCache::new(dir.path().join("cache"));
        let registry = ManifestRegistry::new(&manifest_path, cache.clone());

        let artifact = registry.fetch_version_artifact("fraud", "1").await.unwrap();
        assert_eq!(artifact.path, cache.artifact_path("fraud", "1"));

        let err = registry.fetch_version_artifact("fraud", "9").await.unwrap_err();
        assert!(matches!(err, RegistryError::VersionNotFound { .. }));
    }

    #[tokio::test]
    async fn test_missing_manifest_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ManifestRegistry::new(dir.path().join("nope.yaml"), ArtifactCache::new(dir.path()));
        assert!(matches!(registry.list_models().await, Err(RegistryError::Io { .. })));
    }
}
