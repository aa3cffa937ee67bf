//! Reconciliation tick
//!
//! One tick observes both sides, computes what changed, and pushes the
//! difference to the deploy target in a fixed order: new versions first,
//! then stage routing, then retired versions. Retired versions that an
//! endpoint still routes to, because its routing change was deferred or
//! skipped, are kept until a later tick has moved the endpoint off them.

use crate::error::ReconcileError;
use modelsync_deploy::{DeployTarget, EndpointOutcome, StageReport};
use modelsync_registry::ModelRegistry;
use modelsync_types::{Artifact, ModelVersion, RoutingTable, VersionDelta};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// What one tick observed and did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub desired_versions: usize,
    pub current_versions: usize,
    pub new_versions: usize,
    pub expired_versions: usize,
    /// Expired versions kept because an endpoint still routes to them
    pub retained_versions: usize,
    /// `(model, stage, version)` triples live at the start of the tick
    pub current_deployments: usize,
    pub created_deployments: usize,
    pub deleted_deployments: usize,
    /// Stage actions postponed because the endpoint was busy
    pub deferred_stages: usize,
    pub elapsed: Duration,
}

impl TickReport {
    /// Nothing left to do: both sides already agree
    pub fn is_converged(&self) -> bool {
        self.new_versions == 0
            && self.expired_versions == 0
            && self.retained_versions == 0
            && self.created_deployments == 0
            && self.deleted_deployments == 0
    }
}

/// Compares registry and deploy target and applies the difference
pub struct Reconciler {
    registry: Arc<dyn ModelRegistry>,
    target: Arc<dyn DeployTarget>,
}

impl Reconciler {
    pub fn new(registry: Arc<dyn ModelRegistry>, target: Arc<dyn DeployTarget>) -> Self {
        Self { registry, target }
    }

    /// Run one reconciliation pass
    pub async fn tick(&self) -> Result<TickReport, ReconcileError> {
        let started = Instant::now();

        debug!(registry = self.registry.name(), "Reading models from registry");
        let desired = self
            .registry
            .list_models()
            .await
            .map_err(ReconcileError::ListDesired)?;

        debug!(deploy_target = self.target.name(), "Reading models from deploy target");
        let current = self
            .target
            .list_models()
            .await
            .map_err(ReconcileError::ListCurrent)?;
        debug!(desired = desired.len(), current = current.len(), "Observed models");

        let delta = VersionDelta::between(&desired, &current);
        let desired_versions = modelsync_types::delta::union_of(&desired).len();
        let current_versions = modelsync_types::delta::union_of(&current).len();

        let mut artifacts: BTreeMap<ModelVersion, Artifact> = BTreeMap::new();
        for version in &delta.new {
            info!(version = %version, "Fetching artifact");
            let artifact = self
                .registry
                .fetch_version_artifact(&version.model_name, &version.version_id)
                .await
                .map_err(|source| ReconcileError::FetchArtifact {
                    version: version.clone(),
                    source,
                })?;
            debug!(version = %version, artifact = %artifact, "Fetched artifact");
            artifacts.insert(version.clone(), artifact);
        }

        let current_routing = RoutingTable::from_models(&current);
        let desired_routing = RoutingTable::from_models(&desired);

        self.target
            .create_versions(&artifacts)
            .await
            .map_err(ReconcileError::CreateVersions)?;

        let stages = self
            .target
            .update_version_stage(&current_routing, &desired_routing)
            .await
            .map_err(ReconcileError::UpdateRouting)?;

        let retained = still_routed(&stages, &current_routing, &delta.expired);
        if !retained.is_empty() {
            info!(
                versions = ?retained.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "Keeping expired versions until their endpoints are rerouted"
            );
        }
        let expired: BTreeSet<ModelVersion> = delta.expired.difference(&retained).cloned().collect();

        self.target
            .delete_versions(&expired)
            .await
            .map_err(ReconcileError::DeleteVersions)?;

        if let Err(e) = self.registry.tag_deployed_models(&current).await {
            warn!(error = %e, "Failed to tag deployed models");
        }

        let desired_deployments = desired_routing.deployments();
        let current_deployments = current_routing.deployments();

        Ok(TickReport {
            desired_versions,
            current_versions,
            new_versions: delta.new.len(),
            expired_versions: expired.len(),
            retained_versions: retained.len(),
            current_deployments: current_deployments.len(),
            created_deployments: desired_deployments.difference(&current_deployments).count(),
            deleted_deployments: current_deployments.difference(&desired_deployments).count(),
            deferred_stages: stages.count(EndpointOutcome::Deferred),
            elapsed: started.elapsed(),
        })
    }
}

/// Expired versions still served by a binding that was left as it is
fn still_routed(
    stages: &StageReport,
    current: &RoutingTable,
    expired: &BTreeSet<ModelVersion>,
) -> BTreeSet<ModelVersion> {
    stages
        .outcomes
        .iter()
        .filter(|(_, outcome)| {
            matches!(outcome, EndpointOutcome::Deferred | EndpointOutcome::Skipped)
        })
        .filter_map(|(key, _)| {
            current
                .get(&key.model, &key.stage)
                .map(|versions| (key, versions))
        })
        .flat_map(|(key, versions)| {
            versions
                .iter()
                .map(move |version| ModelVersion::new(&key.model, version))
        })
        .filter(|version| expired.contains(version))
        .collect()
}
