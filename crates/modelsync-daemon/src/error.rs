//! Error types for modelsyncd

use modelsync_deploy::DeployError;
use modelsync_registry::RegistryError;
use modelsync_types::ModelVersion;
use thiserror::Error;

/// Daemon errors
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Deploy target error: {0}")]
    Deploy(#[from] DeployError),

    #[error("Reconciliation failed: {0}")]
    Reconcile(#[from] ReconcileError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for DaemonError {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

/// A reconciliation tick that stopped part way
///
/// Each variant names the step that failed. Steps already taken are not
/// rolled back; the next tick starts over from fresh observations.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("listing desired models: {0}")]
    ListDesired(#[source] RegistryError),

    #[error("listing deployed models: {0}")]
    ListCurrent(#[source] DeployError),

    #[error("fetching artifact for {version}: {source}")]
    FetchArtifact {
        version: ModelVersion,
        #[source]
        source: RegistryError,
    },

    #[error("creating versions: {0}")]
    CreateVersions(#[source] DeployError),

    #[error("updating stage routing: {0}")]
    UpdateRouting(#[source] DeployError),

    #[error("deleting versions: {0}")]
    DeleteVersions(#[source] DeployError),
}

/// Result type for daemon operations
pub type DaemonResult<T> = Result<T, DaemonError>;
