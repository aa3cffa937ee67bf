//! Models and artifacts
//!
//! A Model maps free-form stage labels to the versions bound to them. The
//! same version may be bound to several stages at once.

use crate::version::{ModelEndpoint, ModelVersion};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Stage label synthesized for versions that carry no registry stage
pub const LATEST_STAGE: &str = "Latest";

/// Registry stage whose versions are never deployed
pub const ARCHIVED_STAGE: &str = "Archived";

/// A registered model and its stage bindings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Model {
    /// Registered model name
    pub name: String,

    /// Stage label -> versions bound to that stage
    #[serde(default)]
    pub versions: BTreeMap<String, BTreeSet<ModelEndpoint>>,
}

impl Model {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            versions: BTreeMap::new(),
        }
    }

    /// Bind `version_ids` of this model to `stage`, replacing any prior binding
    pub fn with_stage<I, S>(mut self, stage: impl Into<String>, version_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let versions = version_ids
            .into_iter()
            .map(|id| ModelEndpoint::new(ModelVersion::new(self.name.clone(), id)))
            .collect();
        self.versions.insert(stage.into(), versions);
        self
    }

    /// Add a single binding to `stage`
    pub fn bind(&mut self, stage: impl Into<String>, endpoint: ModelEndpoint) {
        self.versions.entry(stage.into()).or_default().insert(endpoint);
    }

    /// Versions bound to `stage`, if the stage exists
    pub fn stage(&self, stage: &str) -> Option<&BTreeSet<ModelEndpoint>> {
        self.versions.get(stage)
    }

    /// Every version bound to any stage, deduplicated across stages
    pub fn unique_versions(&self) -> BTreeSet<ModelVersion> {
        self.versions
            .values()
            .flatten()
            .map(|endpoint| endpoint.version.clone())
            .collect()
    }
}

/// A packaged, deployable unit for exactly one model version
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Local path of the packaged file
    pub path: PathBuf,
}

impl Artifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl std::fmt::Display for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path.display())
    }
}
