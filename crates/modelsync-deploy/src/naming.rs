//! Platform resource naming
//!
//! Names are the only link between platform resources and the routing table,
//! so they must round-trip:
//!
//! - endpoint and endpoint config: `{prefix}-{model}-{stage}`
//! - model resource: `{prefix}-{model}-{version_id}`
//! - artifact object key: `{model}/{version_id}/artifact.tar.gz`
//!
//! Model names may contain `-`; stage labels may not, since the stage is
//! recovered as the last `-` segment of an endpoint name.

use modelsync_types::ModelVersion;

const ARTIFACT_OBJECT: &str = "artifact.tar.gz";

/// Resource naming under one prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Naming {
    prefix: String,
}

impl Naming {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// `{prefix}-`, the filter every owned resource matches
    pub fn resource_prefix(&self) -> String {
        format!("{}-", self.prefix)
    }

    /// Whether a listed resource belongs to this controller
    ///
    /// Platform listings match by substring, so names are checked again.
    pub fn owns(&self, name: &str) -> bool {
        name.starts_with(&self.resource_prefix())
    }

    pub fn endpoint(&self, model: &str, stage: &str) -> String {
        format!("{}-{}-{}", self.prefix, model, stage)
    }

    pub fn endpoint_config(&self, model: &str, stage: &str) -> String {
        self.endpoint(model, stage)
    }

    pub fn model_resource(&self, model: &str, version_id: &str) -> String {
        format!("{}-{}-{}", self.prefix, model, version_id)
    }

    pub fn model_resource_for(&self, version: &ModelVersion) -> String {
        self.model_resource(&version.model_name, &version.version_id)
    }

    /// Version id served by a model resource of `model`
    ///
    /// `None` when the resource was not named for `model` under this prefix.
    pub fn version_from_model_resource<'a>(&self, resource: &'a str, model: &str) -> Option<&'a str> {
        let prefix = format!("{}-{}-", self.prefix, model);
        resource.strip_prefix(&prefix).filter(|id| !id.is_empty())
    }

    /// Split an endpoint name into `(model, stage)`
    pub fn parse_endpoint<'a>(&self, name: &'a str) -> Option<(&'a str, &'a str)> {
        let rest = name.strip_prefix(&self.resource_prefix())?;
        let (model, stage) = rest.rsplit_once('-')?;
        if model.is_empty() || stage.is_empty() {
            return None;
        }
        Some((model, stage))
    }

    pub fn artifact_key(&self, version: &ModelVersion) -> String {
        format!(
            "{}/{}/{}",
            version.model_name, version.version_id, ARTIFACT_OBJECT
        )
    }
}

/// Stage labels that survive the endpoint naming round trip
pub fn is_routable_stage(stage: &str) -> bool {
    !stage.is_empty() && !stage.contains('-')
}
