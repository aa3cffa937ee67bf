//! In-memory serving platform
//!
//! Behaves like a managed platform closely enough to exercise the endpoint
//! lifecycle: transitions settle asynchronously after a fixed latency,
//! endpoints in a transitional status reject mutation, and endpoint names
//! stay taken until deletion completes. Time is read from `tokio::time` so
//! tests can pause and advance it.

use crate::error::{PlatformError, PlatformResult, ResourceKind};
use crate::platform::{
    EndpointConfig, EndpointDescription, EndpointPlatform, EndpointSummary, ModelResource,
    ProductionVariant,
};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use modelsync_types::EndpointStatus;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Platform operations, for fault injection and the call log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlatformOp {
    ListEndpoints,
    DescribeEndpoint,
    DescribeEndpointConfig,
    ListEndpointConfigs,
    CreateEndpointConfig,
    DeleteEndpointConfig,
    CreateEndpoint,
    UpdateEndpoint,
    DeleteEndpoint,
    CreateModel,
    DeleteModel,
    ListModels,
    EnsureExecutionRole,
    DeleteExecutionRole,
}

/// One recorded platform call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformCall {
    pub op: PlatformOp,
    /// Resource name or filter the call was made with
    pub target: String,
}

#[derive(Debug, Clone)]
struct SimEndpoint {
    config_name: String,
    variants: Vec<ProductionVariant>,
    status: EndpointStatus,
    since: Instant,
    failure_reason: Option<String>,
}

impl SimEndpoint {
    fn enter(&mut self, status: EndpointStatus) {
        self.status = status;
        self.since = Instant::now();
    }
}

/// Simulated serving platform
pub struct SimulatedPlatform {
    region: String,
    account_id: String,
    settle: Duration,
    endpoints: DashMap<String, SimEndpoint>,
    configs: DashMap<String, EndpointConfig>,
    models: DashMap<String, ModelResource>,
    roles: DashSet<String>,
    faults: DashMap<PlatformOp, PlatformError>,
    calls: Mutex<Vec<PlatformCall>>,
}

impl SimulatedPlatform {
    pub fn new(region: impl Into<String>, account_id: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            account_id: account_id.into(),
            settle: Duration::ZERO,
            endpoints: DashMap::new(),
            configs: DashMap::new(),
            models: DashMap::new(),
            roles: DashSet::new(),
            faults: DashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// How long Creating, Updating and Deleting take to settle
    pub fn with_settle_time(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Fail the next call of `op` with `error`
    pub fn fail_next(&self, op: PlatformOp, error: PlatformError) {
        self.faults.insert(op, error);
    }

    /// Force an endpoint into `status`, as an out-of-band platform event would
    pub fn force_status(&self, name: &str, status: EndpointStatus) -> bool {
        match self.endpoints.get_mut(name) {
            Some(mut endpoint) => {
                if status == EndpointStatus::Failed {
                    endpoint.failure_reason = Some("forced failure".into());
                }
                endpoint.enter(status);
                true
            }
            None => false,
        }
    }

    /// Current status of an endpoint, after settling
    pub fn endpoint_status(&self, name: &str) -> Option<EndpointStatus> {
        self.settle_transitions();
        self.endpoints.get(name).map(|e| e.status.clone())
    }

    /// Variants an endpoint is currently serving
    pub fn endpoint_variants(&self, name: &str) -> Option<Vec<ProductionVariant>> {
        self.endpoints.get(name).map(|e| e.variants.clone())
    }

    pub fn has_endpoint_config(&self, name: &str) -> bool {
        self.configs.contains_key(name)
    }

    pub fn has_model(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub async fn calls(&self) -> Vec<PlatformCall> {
        self.calls.lock().await.clone()
    }

    /// Recorded calls of one kind
    pub async fn calls_of(&self, op: PlatformOp) -> Vec<String> {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|c| c.op == op)
            .map(|c| c.target.clone())
            .collect()
    }

    pub async fn clear_calls(&self) {
        self.calls.lock().await.clear();
    }

    fn role_arn(&self, role: &str) -> String {
        format!("arn:aws:iam::{}:role/{}", self.account_id, role)
    }

    async fn record(&self, op: PlatformOp, target: &str) -> PlatformResult<()> {
        self.calls.lock().await.push(PlatformCall {
            op,
            target: target.to_string(),
        });
        match self.faults.remove(&op) {
            Some((_, error)) => {
                debug!(?op, resource = target, error = %error, "Injected platform fault");
                Err(error)
            }
            None => Ok(()),
        }
    }

    /// Advance every endpoint whose transition latency has elapsed
    fn settle_transitions(&self) {
        let now = Instant::now();
        let mut removed = Vec::new();

        for mut entry in self.endpoints.iter_mut() {
            if now.duration_since(entry.since) < self.settle {
                continue;
            }
            if entry.status.is_transitional() {
                let missing = entry
                    .variants
                    .iter()
                    .find(|v| !self.models.contains_key(&v.model_name))
                    .map(|v| v.model_name.clone());
                match missing {
                    Some(model) => {
                        entry.failure_reason = Some(format!("Model {model} not found"));
                        entry.enter(EndpointStatus::Failed);
                    }
                    None => {
                        entry.failure_reason = None;
                        entry.enter(EndpointStatus::InService);
                    }
                }
            } else if entry.status == EndpointStatus::Deleting {
                removed.push(entry.key().clone());
            }
        }

        for name in removed {
            self.endpoints.remove(&name);
        }
    }

    fn mutable_endpoint_status(&self, name: &str) -> PlatformResult<EndpointStatus> {
        let endpoint = self
            .endpoints
            .get(name)
            .ok_or_else(|| PlatformError::not_found(ResourceKind::Endpoint, name))?;
        Ok(endpoint.status.clone())
    }
}

#[async_trait]
impl EndpointPlatform for SimulatedPlatform {
    async fn list_endpoints(
        &self,
        name_contains: &str,
        status: Option<&EndpointStatus>,
    ) -> PlatformResult<Vec<EndpointSummary>> {
        self.record(PlatformOp::ListEndpoints, name_contains).await?;
        self.settle_transitions();

        let mut endpoints: Vec<EndpointSummary> = self
            .endpoints
            .iter()
            .filter(|e| e.key().contains(name_contains))
            .filter(|e| status.map_or(true, |s| &e.status == s))
            .map(|e| EndpointSummary {
                name: e.key().clone(),
                status: e.status.clone(),
            })
            .collect();
        endpoints.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(endpoints)
    }

    async fn describe_endpoint(&self, name: &str) -> PlatformResult<EndpointDescription> {
        self.record(PlatformOp::DescribeEndpoint, name).await?;
        self.settle_transitions();

        self.endpoints
            .get(name)
            .map(|e| EndpointDescription {
                name: name.to_string(),
                config_name: e.config_name.clone(),
                status: e.status.clone(),
                failure_reason: e.failure_reason.clone(),
                variant_models: e.variants.iter().map(|v| v.model_name.clone()).collect(),
            })
            .ok_or_else(|| PlatformError::not_found(ResourceKind::Endpoint, name))
    }

    async fn describe_endpoint_config(&self, name: &str) -> PlatformResult<EndpointConfig> {
        self.record(PlatformOp::DescribeEndpointConfig, name).await?;
        self.configs
            .get(name)
            .map(|c| c.clone())
            .ok_or_else(|| PlatformError::not_found(ResourceKind::EndpointConfig, name))
    }

    async fn list_endpoint_configs(&self, name_contains: &str) -> PlatformResult<Vec<String>> {
        self.record(PlatformOp::ListEndpointConfigs, name_contains).await?;
        let mut names: Vec<String> = self
            .configs
            .iter()
            .filter(|c| c.key().contains(name_contains))
            .map(|c| c.key().clone())
            .collect();
        names.sort();
        Ok(names)
    }

    async fn create_endpoint_config(&self, config: EndpointConfig) -> PlatformResult<()> {
        self.record(PlatformOp::CreateEndpointConfig, &config.name).await?;
        if config.variants.is_empty() {
            return Err(PlatformError::Validation(format!(
                "Endpoint config {} has no production variants",
                config.name
            )));
        }
        if self.configs.contains_key(&config.name) {
            return Err(PlatformError::already_exists(
                ResourceKind::EndpointConfig,
                &config.name,
            ));
        }
        self.configs.insert(config.name.clone(), config);
        Ok(())
    }

    async fn delete_endpoint_config(&self, name: &str) -> PlatformResult<()> {
        self.record(PlatformOp::DeleteEndpointConfig, name).await?;
        self.configs
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| PlatformError::not_found(ResourceKind::EndpointConfig, name))
    }

    async fn create_endpoint(&self, name: &str, config_name: &str) -> PlatformResult<()> {
        self.record(PlatformOp::CreateEndpoint, name).await?;
        self.settle_transitions();

        if self.endpoints.contains_key(name) {
            return Err(PlatformError::already_exists(ResourceKind::Endpoint, name));
        }
        let config = self.configs.get(config_name).ok_or_else(|| {
            PlatformError::Validation(format!(
                "Could not find endpoint configuration {config_name}"
            ))
        })?;

        self.endpoints.insert(
            name.to_string(),
            SimEndpoint {
                config_name: config_name.to_string(),
                variants: config.variants.clone(),
                status: EndpointStatus::Creating,
                since: Instant::now(),
                failure_reason: None,
            },
        );
        Ok(())
    }

    async fn update_endpoint(
        &self,
        name: &str,
        config_name: &str,
        retain_all_variant_properties: bool,
    ) -> PlatformResult<()> {
        self.record(PlatformOp::UpdateEndpoint, name).await?;
        self.settle_transitions();

        let status = self.mutable_endpoint_status(name)?;
        if status != EndpointStatus::InService {
            return Err(PlatformError::InvalidState {
                name: name.to_string(),
                status,
            });
        }
        let mut variants = self
            .configs
            .get(config_name)
            .map(|c| c.variants.clone())
            .ok_or_else(|| {
                PlatformError::Validation(format!(
                    "Could not find endpoint configuration {config_name}"
                ))
            })?;

        if let Some(mut endpoint) = self.endpoints.get_mut(name) {
            if retain_all_variant_properties {
                for variant in &mut variants {
                    if let Some(old) = endpoint
                        .variants
                        .iter()
                        .find(|old| old.variant_name == variant.variant_name)
                    {
                        variant.initial_weight = old.initial_weight;
                        variant.initial_instance_count = old.initial_instance_count;
                        variant.instance_type = old.instance_type.clone();
                    }
                }
            }
            endpoint.config_name = config_name.to_string();
            endpoint.variants = variants;
            endpoint.enter(EndpointStatus::Updating);
        }
        Ok(())
    }

    async fn delete_endpoint(&self, name: &str) -> PlatformResult<()> {
        self.record(PlatformOp::DeleteEndpoint, name).await?;
        self.settle_transitions();

        let status = self.mutable_endpoint_status(name)?;
        if status.is_transitional() || status == EndpointStatus::Deleting {
            return Err(PlatformError::InvalidState {
                name: name.to_string(),
                status,
            });
        }
        if let Some(mut endpoint) = self.endpoints.get_mut(name) {
            endpoint.enter(EndpointStatus::Deleting);
        }
        self.settle_transitions();
        Ok(())
    }

    async fn create_model(&self, model: ModelResource) -> PlatformResult<()> {
        self.record(PlatformOp::CreateModel, &model.name).await?;

        let role = model
            .execution_role_arn
            .rsplit_once("role/")
            .map(|(_, role)| role)
            .unwrap_or_default();
        if !self.roles.contains(role) {
            return Err(PlatformError::Validation(format!(
                "Could not assume role {}",
                model.execution_role_arn
            )));
        }
        if self.models.contains_key(&model.name) {
            return Err(PlatformError::already_exists(ResourceKind::Model, &model.name));
        }
        self.models.insert(model.name.clone(), model);
        Ok(())
    }

    async fn delete_model(&self, name: &str) -> PlatformResult<()> {
        self.record(PlatformOp::DeleteModel, name).await?;
        self.models
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| PlatformError::not_found(ResourceKind::Model, name))
    }

    async fn list_models(&self, name_contains: &str) -> PlatformResult<Vec<String>> {
        self.record(PlatformOp::ListModels, name_contains).await?;
        let mut names: Vec<String> = self
            .models
            .iter()
            .filter(|m| m.key().contains(name_contains))
            .map(|m| m.key().clone())
            .collect();
        names.sort();
        Ok(names)
    }

    async fn ensure_execution_role(&self, role: &str) -> PlatformResult<String> {
        self.record(PlatformOp::EnsureExecutionRole, role).await?;
        self.roles.insert(role.to_string());
        Ok(self.role_arn(role))
    }

    async fn delete_execution_role(&self, role: &str) -> PlatformResult<()> {
        self.record(PlatformOp::DeleteExecutionRole, role).await?;
        self.roles
            .remove(role)
            .map(|_| ())
            .ok_or_else(|| PlatformError::not_found(ResourceKind::Role, role))
    }

    fn endpoint_url(&self, name: &str) -> String {
        format!(
            "https://runtime.{}.modelsync.local/endpoints/{}/invocations",
            self.region, name
        )
    }
}
