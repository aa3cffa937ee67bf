//! Deploy targets
//!
//! A DeployTarget is the source of actual state and the executor of changes.
//! [`EndpointDeployTarget`] maps each `(model, stage)` binding to a serving
//! endpoint and each version to a model resource backed by an uploaded
//! artifact.

use crate::endpoint::{EndpointLifecycle, EndpointOutcome, VariantSettings};
use crate::error::{DeployError, PlatformError, Result, StoreError};
use crate::naming::Naming;
use crate::platform::{EndpointPlatform, ModelResource};
use crate::routing;
use crate::store::ArtifactStore;
use async_trait::async_trait;
use modelsync_types::{
    Artifact, EndpointStatus, Model, ModelEndpoint, ModelVersion, RoutingTable, StageKey,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};

/// Destination that serves model versions per stage
#[async_trait]
pub trait DeployTarget: Send + Sync {
    /// Target kind, for logging
    fn name(&self) -> &str;

    /// Identifies the account or installation being deployed to
    fn target_id(&self) -> &str;

    /// Bindings currently live, with serving locations where known
    async fn list_models(&self) -> Result<Vec<Model>>;

    /// Provision shared resources. Idempotent.
    async fn init(&self) -> Result<()>;

    /// Remove every resource this controller owns
    async fn teardown(&self) -> Result<()>;

    /// Materialize per-version resources, artifacts first
    async fn create_versions(&self, versions: &BTreeMap<ModelVersion, Artifact>) -> Result<()>;

    /// Converge stage routing from `current` to `desired`
    async fn update_version_stage(
        &self,
        current: &RoutingTable,
        desired: &RoutingTable,
    ) -> Result<StageReport>;

    /// Remove per-version resources
    ///
    /// Callers pass only versions no stage routes to any more.
    async fn delete_versions(&self, versions: &BTreeSet<ModelVersion>) -> Result<()>;
}

/// Outcome of every stage action in one routing pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub outcomes: Vec<(StageKey, EndpointOutcome)>,
}

impl StageReport {
    pub fn count(&self, outcome: EndpointOutcome) -> usize {
        self.outcomes.iter().filter(|(_, o)| *o == outcome).count()
    }

    /// Stage deployments created or replaced
    pub fn deployed(&self) -> usize {
        self.count(EndpointOutcome::Created) + self.count(EndpointOutcome::Replaced)
    }

    /// Stage deployments removed, recycled ones included
    pub fn removed(&self) -> usize {
        self.count(EndpointOutcome::Deleted) + self.count(EndpointOutcome::Recycled)
    }

    pub fn deferred(&self) -> usize {
        self.count(EndpointOutcome::Deferred)
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Settings for an endpoint-based target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointTargetConfig {
    /// Prefix of every owned resource name
    pub name_prefix: String,
    pub region: String,
    pub account_id: String,
    pub instance_type: String,
    pub initial_instance_count: u32,
    pub execution_role: String,
    /// How long teardown waits for endpoints to become deletable
    pub teardown_timeout_secs: u64,
    pub teardown_poll_secs: u64,
}

impl Default for EndpointTargetConfig {
    fn default() -> Self {
        Self {
            name_prefix: "msync".into(),
            region: "us-east-1".into(),
            account_id: "000000000000".into(),
            instance_type: "ml.t2.medium".into(),
            initial_instance_count: 1,
            execution_role: "modelsync-execution".into(),
            teardown_timeout_secs: 20 * 60,
            teardown_poll_secs: 30,
        }
    }
}

impl EndpointTargetConfig {
    pub fn bucket(&self) -> String {
        format!("modelsync-models-{}-{}", self.account_id, self.region)
    }
}

/// Deploys each stage binding to a platform endpoint
pub struct EndpointDeployTarget {
    config: EndpointTargetConfig,
    naming: Naming,
    platform: Arc<dyn EndpointPlatform>,
    store: Arc<dyn ArtifactStore>,
    lifecycle: EndpointLifecycle,
}

impl EndpointDeployTarget {
    pub fn new(
        config: EndpointTargetConfig,
        platform: Arc<dyn EndpointPlatform>,
        store: Arc<dyn ArtifactStore>,
    ) -> Self {
        let naming = Naming::new(&config.name_prefix);
        let settings = VariantSettings {
            instance_type: config.instance_type.clone(),
            initial_instance_count: config.initial_instance_count,
        };
        let lifecycle = EndpointLifecycle::new(platform.clone(), naming.clone(), settings);
        info!(
            region = %config.region,
            account = %config.account_id,
            prefix = %config.name_prefix,
            "Endpoint deploy target initialized"
        );
        Self {
            config,
            naming,
            platform,
            store,
            lifecycle,
        }
    }

    pub fn config(&self) -> &EndpointTargetConfig {
        &self.config
    }

    pub fn naming(&self) -> &Naming {
        &self.naming
    }

    pub fn lifecycle(&self) -> &EndpointLifecycle {
        &self.lifecycle
    }

    fn role_arn(&self) -> String {
        format!(
            "arn:aws:iam::{}:role/{}",
            self.config.account_id, self.config.execution_role
        )
    }

    async fn create_version(&self, version: &ModelVersion, artifact: &Artifact) -> Result<()> {
        let bucket = self.config.bucket();
        let key = self.naming.artifact_key(version);
        let url = self
            .store
            .upload(&bucket, &key, artifact.path())
            .await
            .inspect_err(|e| error!(version = %version, key = %key, error = %e, "Failed to upload artifact"))?;

        let resource = ModelResource {
            name: self.naming.model_resource_for(version),
            artifact_url: url,
            execution_role_arn: self.role_arn(),
        };
        let name = resource.name.clone();
        match self.platform.create_model(resource).await {
            Ok(()) => {
                info!(version = %version, model_resource = %name, "Created model resource");
                Ok(())
            }
            // A resource left behind by an interrupted tick serves the same artifact.
            Err(PlatformError::AlreadyExists { .. }) => {
                warn!(version = %version, model_resource = %name, "Model resource already exists");
                Ok(())
            }
            Err(e) => {
                error!(version = %version, model_resource = %name, error = %e, "Failed to create model resource");
                Err(e.into())
            }
        }
    }

    async fn delete_version(&self, version: &ModelVersion) -> Result<()> {
        let name = self.naming.model_resource_for(version);
        match self.platform.delete_model(&name).await {
            Ok(()) => info!(version = %version, model_resource = %name, "Deleted model resource"),
            Err(e) if e.is_not_found() => {
                warn!(version = %version, model_resource = %name, "Model resource already gone")
            }
            Err(e) => {
                error!(version = %version, model_resource = %name, error = %e, "Failed to delete model resource");
                return Err(e.into());
            }
        }

        let key = self.naming.artifact_key(version);
        match self.store.delete(&self.config.bucket(), &key).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => {
                warn!(version = %version, key = %key, "Artifact already gone");
                Ok(())
            }
            Err(e) => {
                error!(version = %version, key = %key, error = %e, "Failed to delete artifact");
                Err(e.into())
            }
        }
    }

    /// Model resources an endpoint routes to, `None` if it vanished
    ///
    /// The endpoint config is authoritative. When it is missing, because a
    /// config rewrite or a delete stopped half way, the variants the endpoint
    /// still runs are used so the binding stays visible and is corrected.
    async fn served_models(
        &self,
        endpoint: &str,
        model: &str,
        stage: &str,
    ) -> Result<Option<Vec<String>>> {
        match self
            .platform
            .describe_endpoint_config(&self.naming.endpoint_config(model, stage))
            .await
        {
            Ok(config) => {
                return Ok(Some(
                    config.variants.into_iter().map(|v| v.model_name).collect(),
                ))
            }
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }

        match self.platform.describe_endpoint(endpoint).await {
            Ok(description) => {
                warn!(
                    endpoint,
                    status = %description.status,
                    "Endpoint has no config, using the variants it runs"
                );
                Ok(Some(description.variant_models))
            }
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Wait until every endpoint is InService or Failed, or gone
    async fn wait_deletable(&self, endpoints: &[String]) -> Result<()> {
        let poll = Duration::from_secs(self.config.teardown_poll_secs.max(1));
        let deadline = tokio::time::Instant::now() + Duration::from_secs(self.config.teardown_timeout_secs);

        loop {
            let mut pending = Vec::new();
            for name in endpoints {
                match self.lifecycle.observe(name).await? {
                    Some(status) if status.is_transitional() => pending.push(name.clone()),
                    _ => {}
                }
            }
            if pending.is_empty() {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(DeployError::TeardownTimeout(pending));
            }
            info!(pending = ?pending, wait_secs = poll.as_secs(), "Waiting for endpoints to become deletable");
            tokio::time::sleep(poll).await;
        }
    }

    async fn teardown_endpoints(&self) -> Result<()> {
        let prefix = self.naming.resource_prefix();
        let endpoints: Vec<String> = self
            .platform
            .list_endpoints(&prefix, None)
            .await?
            .into_iter()
            .map(|e| e.name)
            .filter(|name| self.naming.owns(name))
            .collect();

        if endpoints.is_empty() {
            info!("No endpoints found");
            return Ok(());
        }

        self.wait_deletable(&endpoints).await?;
        for name in &endpoints {
            info!(endpoint = %name, "Removing endpoint");
            match self.platform.delete_endpoint(name).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(PlatformError::InvalidState {
                    status: EndpointStatus::Deleting,
                    ..
                }) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[async_trait]
impl DeployTarget for EndpointDeployTarget {
    fn name(&self) -> &str {
        "endpoint"
    }

    fn target_id(&self) -> &str {
        &self.config.account_id
    }

    #[instrument(skip(self))]
    async fn list_models(&self) -> Result<Vec<Model>> {
        let prefix = self.naming.resource_prefix();
        let mut endpoints = Vec::new();
        for status in &EndpointStatus::LISTED {
            endpoints.extend(self.platform.list_endpoints(&prefix, Some(status)).await?);
        }

        let mut output: BTreeMap<String, Model> = BTreeMap::new();
        for endpoint in endpoints {
            let Some((model_name, stage)) = self.naming.parse_endpoint(&endpoint.name) else {
                debug!(endpoint = %endpoint.name, "Ignoring endpoint not owned by this controller");
                continue;
            };
            let Some(resources) = self.served_models(&endpoint.name, model_name, stage).await? else {
                continue;
            };

            let location = self.platform.endpoint_url(&endpoint.name);
            let model = output
                .entry(model_name.to_string())
                .or_insert_with(|| Model::new(model_name));
            let bindings: BTreeSet<ModelEndpoint> = resources
                .iter()
                .filter_map(|resource| {
                    let version_id = self.naming.version_from_model_resource(resource, model_name);
                    if version_id.is_none() {
                        warn!(
                            endpoint = %endpoint.name,
                            model_resource = %resource,
                            "Variant does not serve a model resource of this model, ignoring"
                        );
                    }
                    version_id
                })
                .map(|version_id| {
                    ModelEndpoint::new(ModelVersion::new(model_name, version_id))
                        .with_location(location.clone())
                })
                .collect();
            model.versions.insert(stage.to_string(), bindings);
        }

        Ok(output.into_values().collect())
    }

    #[instrument(skip(self))]
    async fn init(&self) -> Result<()> {
        let bucket = self.config.bucket();
        info!(bucket = %bucket, "Creating artifact bucket if missing");
        self.store.ensure_bucket(&bucket).await?;

        info!(role = %self.config.execution_role, "Creating execution role if missing");
        let arn = self
            .platform
            .ensure_execution_role(&self.config.execution_role)
            .await?;
        debug!(arn = %arn, "Execution role ready");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn teardown(&self) -> Result<()> {
        let prefix = self.naming.resource_prefix();

        info!("Removing all endpoints");
        self.teardown_endpoints().await?;

        info!("Removing all endpoint configs");
        for name in self.platform.list_endpoint_configs(&prefix).await? {
            if !self.naming.owns(&name) {
                continue;
            }
            match self.platform.delete_endpoint_config(&name).await {
                Ok(()) => info!(config = %name, "Removed endpoint config"),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }

        info!("Removing all model resources");
        for name in self.platform.list_models(&prefix).await? {
            if !self.naming.owns(&name) {
                continue;
            }
            match self.platform.delete_model(&name).await {
                Ok(()) => info!(model_resource = %name, "Removed model resource"),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }

        let bucket = self.config.bucket();
        match self.store.remove_bucket(&bucket).await {
            Ok(()) => {}
            Err(StoreError::NoSuchBucket(_)) => info!(bucket = %bucket, "No bucket found"),
            Err(e) => error!(bucket = %bucket, error = %e, "Failed to remove bucket"),
        }

        match self
            .platform
            .delete_execution_role(&self.config.execution_role)
            .await
        {
            Ok(()) => info!(role = %self.config.execution_role, "Removed execution role"),
            Err(e) if e.is_not_found() => info!("No role found"),
            Err(e) => error!(role = %self.config.execution_role, error = %e, "Failed to remove execution role"),
        }
        Ok(())
    }

    #[instrument(skip_all, fields(count = versions.len()))]
    async fn create_versions(&self, versions: &BTreeMap<ModelVersion, Artifact>) -> Result<()> {
        for (version, artifact) in versions {
            self.create_version(version, artifact).await?;
        }
        Ok(())
    }

    #[instrument(skip_all)]
    async fn update_version_stage(
        &self,
        current: &RoutingTable,
        desired: &RoutingTable,
    ) -> Result<StageReport> {
        let diff = routing::diff(current, desired);
        let mut report = StageReport::default();
        if diff.is_empty() {
            return Ok(report);
        }
        debug!(
            create = diff.create.len(),
            update = diff.update.len(),
            delete = diff.delete.len(),
            "Routing diff"
        );

        for binding in diff.create.iter().chain(&diff.update) {
            let outcome = self.lifecycle.apply(binding).await?;
            report.outcomes.push((binding.key(), outcome));
        }
        for key in &diff.delete {
            let outcome = self.lifecycle.remove(key).await?;
            report.outcomes.push((key.clone(), outcome));
        }
        Ok(report)
    }

    #[instrument(skip_all, fields(count = versions.len()))]
    async fn delete_versions(&self, versions: &BTreeSet<ModelVersion>) -> Result<()> {
        for version in versions {
            self.delete_version(version).await?;
        }
        Ok(())
    }
}
