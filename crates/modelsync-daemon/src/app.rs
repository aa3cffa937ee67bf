//! Daemon wiring: builds the registry and deploy target from configuration

use crate::config::{DaemonConfig, RegistryKind, TargetKind};
use crate::error::DaemonResult;
use crate::scheduler::{Reconciler, Scheduler};
use modelsync_deploy::{DeployTarget, EndpointDeployTarget, FsArtifactStore, SimulatedPlatform};
use modelsync_registry::{ArtifactCache, ManifestRegistry, ModelRegistry};
use std::sync::Arc;
use tracing::info;

/// A configured registry and deploy target pair
pub struct App {
    config: DaemonConfig,
    cache: ArtifactCache,
    registry: Arc<dyn ModelRegistry>,
    target: Arc<dyn DeployTarget>,
}

impl App {
    /// Build the components named by `config`
    pub fn from_config(config: DaemonConfig) -> Self {
        let cache = ArtifactCache::new(&config.cache.path);

        let registry: Arc<dyn ModelRegistry> = match config.registry.kind {
            RegistryKind::Manifest => Arc::new(ManifestRegistry::new(
                &config.registry.manifest_path,
                cache.clone(),
            )),
        };

        let target: Arc<dyn DeployTarget> = match config.target.kind {
            TargetKind::Simulated => {
                let settings = config.target.endpoint_target();
                let platform = Arc::new(
                    SimulatedPlatform::new(&settings.region, &settings.account_id)
                        .with_settle_time(config.target.settle_time()),
                );
                let store = Arc::new(FsArtifactStore::new(&config.target.artifact_root));
                Arc::new(EndpointDeployTarget::new(settings, platform, store))
            }
        };

        Self::with_components(config, registry, target)
    }

    /// Use components built elsewhere
    pub fn with_components(
        config: DaemonConfig,
        registry: Arc<dyn ModelRegistry>,
        target: Arc<dyn DeployTarget>,
    ) -> Self {
        let cache = ArtifactCache::new(&config.cache.path);
        Self {
            config,
            cache,
            registry,
            target,
        }
    }

    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    /// Create the target's shared resources
    pub async fn init(&self) -> DaemonResult<()> {
        info!(target_id = self.target.target_id(), "Initialising deploy target");
        self.target.init().await?;
        Ok(())
    }

    /// Remove everything this daemon ever deployed
    pub async fn destroy(&self) -> DaemonResult<()> {
        info!(target_id = self.target.target_id(), "Tearing down deploy target");
        self.target.teardown().await?;
        self.registry.reset_tags().await?;
        Ok(())
    }

    /// Reset local state and make sure the target is ready for ticks
    pub async fn prepare(&self) -> DaemonResult<()> {
        self.cache.clear().await?;
        self.registry.reset_tags().await?;
        self.target.init().await?;
        info!(
            registry = self.registry.name(),
            deploy_target = self.target.name(),
            "Ready to reconcile"
        );
        Ok(())
    }

    pub fn scheduler(&self) -> Scheduler {
        let reconciler = Reconciler::new(self.registry.clone(), self.target.clone());
        Scheduler::new(reconciler, self.config.scheduler.interval())
    }
}
