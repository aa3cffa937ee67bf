//! Endpoint lifecycle
//!
//! Every `(model, stage)` binding is served by one platform endpoint whose
//! config lists one uniformly weighted variant per version. The platform
//! moves endpoints between statuses on its own; this module decides, from a
//! single status snapshot, what may safely be done to an endpoint right now.
//! Anything that cannot be done now is deferred to a later tick.

use crate::error::{PlatformError, PlatformResult, Result};
use crate::ledger::EndpointLedger;
use crate::naming::{is_routable_stage, Naming};
use crate::platform::{EndpointConfig, EndpointPlatform, ProductionVariant};
use modelsync_types::{EndpointStatus, StageBinding, StageKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{error, info, warn};

/// What to do with an endpoint whose binding must change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointPlan {
    /// No endpoint exists: create config and endpoint
    Create,
    /// Serving: overwrite the config and update in place
    Replace,
    /// The platform is converging it: try again next tick
    Defer,
    /// Failed: delete it so a later tick recreates it
    Recycle,
    /// Nothing safe to do
    Skip,
}

/// Decide the action for an endpoint in `observed` status
pub fn plan_update(observed: Option<&EndpointStatus>) -> EndpointPlan {
    match observed {
        None => EndpointPlan::Create,
        Some(status) if status.is_transitional() => EndpointPlan::Defer,
        Some(EndpointStatus::InService) => EndpointPlan::Replace,
        Some(EndpointStatus::Failed) => EndpointPlan::Recycle,
        Some(_) => EndpointPlan::Skip,
    }
}

/// Result of acting on one `(model, stage)` binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EndpointOutcome {
    Created,
    Replaced,
    Deferred,
    Recycled,
    Skipped,
    Deleted,
    AlreadyGone,
}

impl EndpointOutcome {
    /// A platform mutation was issued
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Self::Created | Self::Replaced | Self::Recycled | Self::Deleted
        )
    }
}

/// Instance settings applied to every variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantSettings {
    pub instance_type: String,
    pub initial_instance_count: u32,
}

impl Default for VariantSettings {
    fn default() -> Self {
        Self {
            instance_type: "ml.t2.medium".into(),
            initial_instance_count: 1,
        }
    }
}

/// Drives endpoints through their lifecycle
pub struct EndpointLifecycle {
    platform: Arc<dyn EndpointPlatform>,
    naming: Naming,
    settings: VariantSettings,
    ledger: EndpointLedger,
}

impl EndpointLifecycle {
    pub fn new(platform: Arc<dyn EndpointPlatform>, naming: Naming, settings: VariantSettings) -> Self {
        Self {
            platform,
            naming,
            settings,
            ledger: EndpointLedger::new(),
        }
    }

    pub fn ledger(&self) -> &EndpointLedger {
        &self.ledger
    }

    /// Current status of an endpoint, `None` if it does not exist
    pub async fn observe(&self, endpoint: &str) -> PlatformResult<Option<EndpointStatus>> {
        let status = match self.platform.describe_endpoint(endpoint).await {
            Ok(description) => Some(description.status),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };
        self.ledger.observe(endpoint, status.as_ref());
        Ok(status)
    }

    /// Make the endpoint for `binding` serve exactly `binding.versions`
    pub async fn apply(&self, binding: &StageBinding) -> Result<EndpointOutcome> {
        let (model, stage) = (binding.model.as_str(), binding.stage.as_str());
        if !is_routable_stage(stage) {
            error!(model, stage, "Stage label cannot be used in an endpoint name, skipping");
            return Ok(EndpointOutcome::Skipped);
        }

        let endpoint = self.naming.endpoint(model, stage);
        let observed = self.observe(&endpoint).await.inspect_err(|e| {
            error!(model, stage, endpoint = %endpoint, error = %e, "Failed to describe endpoint");
        })?;

        let outcome = match plan_update(observed.as_ref()) {
            EndpointPlan::Create => {
                self.write_config(model, stage, &binding.versions).await?;
                self.platform
                    .create_endpoint(&endpoint, &self.naming.endpoint_config(model, stage))
                    .await
                    .inspect_err(|e| {
                        error!(model, stage, endpoint = %endpoint, error = %e, "Failed to create endpoint");
                    })?;
                info!(model, stage, endpoint = %endpoint, versions = ?binding.versions, "Created endpoint");
                EndpointOutcome::Created
            }
            EndpointPlan::Replace => {
                self.write_config(model, stage, &binding.versions).await?;
                self.platform
                    .update_endpoint(&endpoint, &self.naming.endpoint_config(model, stage), false)
                    .await
                    .inspect_err(|e| {
                        error!(model, stage, endpoint = %endpoint, error = %e, "Failed to update endpoint");
                    })?;
                info!(model, stage, endpoint = %endpoint, versions = ?binding.versions, "Updated endpoint");
                EndpointOutcome::Replaced
            }
            EndpointPlan::Defer => {
                let deferrals = self.ledger.defer(&endpoint);
                warn!(
                    model,
                    stage,
                    endpoint = %endpoint,
                    status = ?observed,
                    deferrals,
                    "Endpoint is not updatable in its current status, deferring"
                );
                return Ok(EndpointOutcome::Deferred);
            }
            EndpointPlan::Recycle => {
                warn!(
                    model,
                    stage,
                    endpoint = %endpoint,
                    "Endpoint failed, deleting it so it is recreated with the new config"
                );
                self.delete_endpoint(model, stage).await?;
                EndpointOutcome::Recycled
            }
            EndpointPlan::Skip => {
                error!(
                    model,
                    stage,
                    endpoint = %endpoint,
                    status = ?observed,
                    "Endpoint cannot be updated in its current status"
                );
                return Ok(EndpointOutcome::Skipped);
            }
        };

        self.ledger.settled(&endpoint);
        Ok(outcome)
    }

    /// Remove the endpoint serving `key`
    pub async fn remove(&self, key: &StageKey) -> Result<EndpointOutcome> {
        let (model, stage) = (key.model.as_str(), key.stage.as_str());
        let endpoint = self.naming.endpoint(model, stage);
        let observed = self.observe(&endpoint).await.inspect_err(|e| {
            error!(model, stage, endpoint = %endpoint, error = %e, "Failed to describe endpoint");
        })?;

        match observed {
            None | Some(EndpointStatus::Deleting) => {
                self.delete_config_if_present(model, stage).await?;
                self.ledger.forget(&endpoint);
                Ok(EndpointOutcome::AlreadyGone)
            }
            Some(status) if status.is_transitional() => {
                let deferrals = self.ledger.defer(&endpoint);
                warn!(model, stage, endpoint = %endpoint, %status, deferrals, "Endpoint is not deletable yet, deferring");
                Ok(EndpointOutcome::Deferred)
            }
            Some(_) => {
                self.delete_endpoint(model, stage).await?;
                self.ledger.forget(&endpoint);
                info!(model, stage, endpoint = %endpoint, "Deleted endpoint");
                Ok(EndpointOutcome::Deleted)
            }
        }
    }

    /// Config listing one weight-1 variant per version
    pub fn config_for(&self, model: &str, stage: &str, versions: &BTreeSet<String>) -> EndpointConfig {
        let variants = versions
            .iter()
            .map(|version| {
                let resource = self.naming.model_resource(model, version);
                ProductionVariant {
                    variant_name: resource.clone(),
                    model_name: resource,
                    initial_instance_count: self.settings.initial_instance_count,
                    instance_type: self.settings.instance_type.clone(),
                    initial_weight: 1.0,
                }
            })
            .collect();
        EndpointConfig {
            name: self.naming.endpoint_config(model, stage),
            variants,
        }
    }

    /// Create the endpoint config, replacing any config of the same name
    async fn write_config(&self, model: &str, stage: &str, versions: &BTreeSet<String>) -> Result<()> {
        self.delete_config_if_present(model, stage).await?;
        let config = self.config_for(model, stage, versions);
        self.platform
            .create_endpoint_config(config)
            .await
            .inspect_err(|e| {
                error!(model, stage, error = %e, "Failed to create endpoint config");
            })?;
        Ok(())
    }

    async fn delete_config_if_present(&self, model: &str, stage: &str) -> Result<()> {
        let name = self.naming.endpoint_config(model, stage);
        match self.platform.delete_endpoint_config(&name).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => {
                error!(model, stage, config = %name, error = %e, "Failed to delete endpoint config");
                Err(e.into())
            }
        }
    }

    async fn delete_endpoint(&self, model: &str, stage: &str) -> Result<()> {
        self.delete_config_if_present(model, stage).await?;
        let endpoint = self.naming.endpoint(model, stage);
        match self.platform.delete_endpoint(&endpoint).await {
            Ok(()) => Ok(()),
            Err(PlatformError::NotFound { .. }) => {
                warn!(model, stage, endpoint = %endpoint, "Endpoint already gone");
                Ok(())
            }
            Err(e) => {
                error!(model, stage, endpoint = %endpoint, error = %e, "Failed to delete endpoint");
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::ModelResource;
    use crate::simulated::{PlatformOp, SimulatedPlatform};
    use std::time::Duration;

    const TRANSITIONAL: [EndpointStatus; 4] = [
        EndpointStatus::Creating,
        EndpointStatus::Updating,
        EndpointStatus::SystemUpdating,
        EndpointStatus::RollingBack,
    ];

    fn ids(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn binding(versions: &[&str]) -> StageBinding {
        StageBinding {
            model: "m1".into(),
            stage: "Prod".into(),
            versions: ids(versions),
        }
    }

    async fn setup() -> (Arc<SimulatedPlatform>, EndpointLifecycle) {
        setup_with_settle(Duration::ZERO).await
    }

    async fn setup_with_settle(settle: Duration) -> (Arc<SimulatedPlatform>, EndpointLifecycle) {
        let platform = Arc::new(SimulatedPlatform::new("us-east-1", "123").with_settle_time(settle));
        let arn = platform.ensure_execution_role("role").await.unwrap();
        for version in ["1", "2"] {
            platform
                .create_model(ModelResource {
                    name: format!("p-m1-{version}"),
                    artifact_url: "file:///a".into(),
                    execution_role_arn: arn.clone(),
                })
                .await
                .unwrap();
        }
        let lifecycle = EndpointLifecycle::new(
            platform.clone(),
            Naming::new("p"),
            VariantSettings::default(),
        );
        (platform, lifecycle)
    }

    #[test]
    fn test_plan_table() {
        assert_eq!(plan_update(None), EndpointPlan::Create);
        for status in &TRANSITIONAL {
            assert_eq!(plan_update(Some(status)), EndpointPlan::Defer);
        }
        assert_eq!(plan_update(Some(&EndpointStatus::InService)), EndpointPlan::Replace);
        assert_eq!(plan_update(Some(&EndpointStatus::Failed)), EndpointPlan::Recycle);
        assert_eq!(plan_update(Some(&EndpointStatus::Deleting)), EndpointPlan::Skip);
        assert_eq!(plan_update(Some(&EndpointStatus::OutOfService)), EndpointPlan::Skip);
        assert_eq!(
            plan_update(Some(&EndpointStatus::Other("Mystery".into()))),
            EndpointPlan::Skip
        );
    }

    #[test]
    fn test_config_is_uniformly_weighted() {
        let platform = Arc::new(SimulatedPlatform::new("us-east-1", "123"));
        let lifecycle = EndpointLifecycle::new(platform, Naming::new("p"), VariantSettings::default());
        let config = lifecycle.config_for("m1", "Prod", &ids(&["1", "2"]));

        assert_eq!(config.name, "p-m1-Prod");
        let names: Vec<_> = config.variants.iter().map(|v| v.model_name.as_str()).collect();
        assert_eq!(names, vec!["p-m1-1", "p-m1-2"]);
        assert!(config.variants.iter().all(|v| v.initial_weight == 1.0));
        assert!(config.variants.iter().all(|v| v.variant_name == v.model_name));
    }

    #[tokio::test]
    async fn test_create_then_replace() {
        let (platform, lifecycle) = setup().await;

        assert_eq!(lifecycle.apply(&binding(&["1"])).await.unwrap(), EndpointOutcome::Created);
        assert_eq!(platform.endpoint_status("p-m1-Prod"), Some(EndpointStatus::InService));

        assert_eq!(lifecycle.apply(&binding(&["1", "2"])).await.unwrap(), EndpointOutcome::Replaced);
        let variants = platform.endpoint_variants("p-m1-Prod").unwrap();
        assert_eq!(variants.len(), 2);
        assert_eq!(platform.calls_of(PlatformOp::UpdateEndpoint).await, vec!["p-m1-Prod".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transitional_statuses_never_update_in_place() {
        let (platform, lifecycle) = setup_with_settle(Duration::from_secs(60)).await;
        lifecycle.apply(&binding(&["1"])).await.unwrap();
        assert_eq!(lifecycle.apply(&binding(&["1", "2"])).await.unwrap(), EndpointOutcome::Deferred);

        for status in TRANSITIONAL {
            tokio::time::advance(Duration::from_secs(61)).await;
            platform.force_status("p-m1-Prod", status);
            platform.clear_calls().await;

            let outcome = lifecycle.apply(&binding(&["1", "2"])).await.unwrap();
            assert_eq!(outcome, EndpointOutcome::Deferred);
            assert!(platform.calls_of(PlatformOp::UpdateEndpoint).await.is_empty());
            assert!(platform.calls_of(PlatformOp::CreateEndpointConfig).await.is_empty());
        }
        assert_eq!(lifecycle.ledger().get("p-m1-Prod").unwrap().deferrals, 1);
    }

    #[tokio::test]
    async fn test_failed_endpoint_is_recycled_not_updated() {
        let (platform, lifecycle) = setup().await;
        lifecycle.apply(&binding(&["1"])).await.unwrap();
        platform.force_status("p-m1-Prod", EndpointStatus::Failed);
        platform.clear_calls().await;

        let outcome = lifecycle.apply(&binding(&["2"])).await.unwrap();
        assert_eq!(outcome, EndpointOutcome::Recycled);
        assert!(platform.calls_of(PlatformOp::UpdateEndpoint).await.is_empty());
        assert_eq!(platform.calls_of(PlatformOp::DeleteEndpoint).await, vec!["p-m1-Prod".to_string()]);
        assert!(!platform.has_endpoint_config("p-m1-Prod"));
        assert_eq!(platform.endpoint_status("p-m1-Prod"), None);

        // Absent now, so the next attempt creates it fresh.
        assert_eq!(lifecycle.apply(&binding(&["2"])).await.unwrap(), EndpointOutcome::Created);
    }

    #[tokio::test]
    async fn test_create_replaces_stale_config() {
        let (platform, lifecycle) = setup().await;
        platform
            .create_endpoint_config(lifecycle.config_for("m1", "Prod", &ids(&["1"])))
            .await
            .unwrap();

        assert_eq!(lifecycle.apply(&binding(&["2"])).await.unwrap(), EndpointOutcome::Created);
        let variants = platform.endpoint_variants("p-m1-Prod").unwrap();
        assert_eq!(variants[0].model_name, "p-m1-2");
    }

    #[tokio::test]
    async fn test_remove() {
        let (platform, lifecycle) = setup().await;
        lifecycle.apply(&binding(&["1"])).await.unwrap();
        let key = StageKey::new("m1", "Prod");

        assert_eq!(lifecycle.remove(&key).await.unwrap(), EndpointOutcome::Deleted);
        assert_eq!(platform.endpoint_status("p-m1-Prod"), None);
        assert_eq!(lifecycle.remove(&key).await.unwrap(), EndpointOutcome::AlreadyGone);
    }

    #[tokio::test]
    async fn test_platform_errors_propagate() {
        let (platform, lifecycle) = setup().await;
        platform.fail_next(
            PlatformOp::DescribeEndpoint,
            PlatformError::Unavailable("down".into()),
        );
        assert!(lifecycle.apply(&binding(&["1"])).await.is_err());
        assert!(platform.calls_of(PlatformOp::CreateEndpoint).await.is_empty());
    }

    #[tokio::test]
    async fn test_dashed_stage_is_skipped() {
        let (platform, lifecycle) = setup().await;
        let mut b = binding(&["1"]);
        b.stage = "blue-green".into();
        assert_eq!(lifecycle.apply(&b).await.unwrap(), EndpointOutcome::Skipped);
        assert!(platform.calls().await.iter().all(|c| c.op != PlatformOp::CreateEndpoint));
    }
}
