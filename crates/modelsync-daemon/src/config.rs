//! Configuration for modelsyncd
//!
//! Layered with the `config` crate: built-in defaults, then an optional file
//! (YAML, TOML or JSON by extension), then `MODELSYNC_` environment
//! variables. Nested keys use a double underscore, for example
//! `MODELSYNC_TARGET__NAME_PREFIX` or `MODELSYNC_SCHEDULER__SCAN_INTERVAL_SECS`.

use crate::error::{DaemonError, DaemonResult};
use modelsync_deploy::EndpointTargetConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main daemon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Where desired state comes from
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Where models are deployed to
    #[serde(default)]
    pub target: TargetConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Local artifact cache
    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Registry backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegistryKind {
    /// YAML or JSON manifest on local disk
    #[default]
    Manifest,
}

/// Registry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub kind: RegistryKind,

    #[serde(default = "default_manifest_path")]
    pub manifest_path: PathBuf,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            kind: RegistryKind::default(),
            manifest_path: default_manifest_path(),
        }
    }
}

/// Deploy target backends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    /// In-process endpoint platform with a local object store
    #[default]
    Simulated,
}

/// Deploy target configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    #[serde(default)]
    pub kind: TargetKind,

    /// Prefix of every platform resource this daemon owns
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,

    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default = "default_account_id")]
    pub account_id: String,

    #[serde(default = "default_instance_type")]
    pub instance_type: String,

    #[serde(default = "default_instance_count")]
    pub initial_instance_count: u32,

    #[serde(default = "default_execution_role")]
    pub execution_role: String,

    /// Root directory of the local object store
    #[serde(default = "default_artifact_root")]
    pub artifact_root: PathBuf,

    /// Simulated transition latency in seconds
    #[serde(default)]
    pub settle_secs: u64,

    /// How long teardown waits for busy endpoints
    #[serde(default = "default_teardown_timeout")]
    pub teardown_timeout_secs: u64,

    #[serde(default = "default_teardown_poll")]
    pub teardown_poll_secs: u64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            kind: TargetKind::default(),
            name_prefix: default_name_prefix(),
            region: default_region(),
            account_id: default_account_id(),
            instance_type: default_instance_type(),
            initial_instance_count: default_instance_count(),
            execution_role: default_execution_role(),
            artifact_root: default_artifact_root(),
            settle_secs: 0,
            teardown_timeout_secs: default_teardown_timeout(),
            teardown_poll_secs: default_teardown_poll(),
        }
    }
}

impl TargetConfig {
    /// Settings for an endpoint-based deploy target
    pub fn endpoint_target(&self) -> EndpointTargetConfig {
        EndpointTargetConfig {
            name_prefix: self.name_prefix.clone(),
            region: self.region.clone(),
            account_id: self.account_id.clone(),
            instance_type: self.instance_type.clone(),
            initial_instance_count: self.initial_instance_count,
            execution_role: self.execution_role.clone(),
            teardown_timeout_secs: self.teardown_timeout_secs,
            teardown_poll_secs: self.teardown_poll_secs,
        }
    }

    pub fn settle_time(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }
}

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Pause between reconciliation ticks in seconds
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            scan_interval_secs: default_scan_interval(),
        }
    }
}

impl SchedulerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }
}

/// Artifact cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cleared every time the daemon starts
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// JSON format
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// Default value helpers
fn default_manifest_path() -> PathBuf {
    PathBuf::from("models.yaml")
}

fn default_name_prefix() -> String {
    "msync".to_string()
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_account_id() -> String {
    "000000000000".to_string()
}

fn default_instance_type() -> String {
    "ml.t2.medium".to_string()
}

fn default_instance_count() -> u32 {
    1
}

fn default_execution_role() -> String {
    "modelsync-execution".to_string()
}

fn default_artifact_root() -> PathBuf {
    std::env::temp_dir().join("modelsync").join("objects")
}

fn default_teardown_timeout() -> u64 {
    1200
}

fn default_teardown_poll() -> u64 {
    30
}

fn default_scan_interval() -> u64 {
    5
}

fn default_cache_path() -> PathBuf {
    std::env::temp_dir().join("modelsync").join("cache")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl DaemonConfig {
    /// Load configuration from defaults, an optional file and the environment
    pub fn load(path: Option<&Path>) -> DaemonResult<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&DaemonConfig::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path.to_path_buf()).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("MODELSYNC")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: DaemonConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the daemon cannot run with
    pub fn validate(&self) -> DaemonResult<()> {
        if self.scheduler.scan_interval_secs == 0 {
            return Err(DaemonError::Config(
                "scheduler.scan_interval_secs must be at least 1".into(),
            ));
        }
        if self.target.name_prefix.is_empty() {
            return Err(DaemonError::Config("target.name_prefix must not be empty".into()));
        }
        if self.target.initial_instance_count == 0 {
            return Err(DaemonError::Config(
                "target.initial_instance_count must be at least 1".into(),
            ));
        }
        if self.target.teardown_poll_secs == 0 {
            return Err(DaemonError::Config(
                "target.teardown_poll_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DaemonConfig::default();
        assert_eq!(config.registry.kind, RegistryKind::Manifest);
        assert_eq!(config.target.kind, TargetKind::Simulated);
        assert_eq!(config.target.name_prefix, "msync");
        assert_eq!(config.target.instance_type, "ml.t2.medium");
        assert_eq!(config.scheduler.scan_interval_secs, 5);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modelsync.yaml");
        std::fs::write(
            &path,
            "registry:\n  manifest_path: /srv/models.yaml\ntarget:\n  name_prefix: team\n  settle_secs: 3\nscheduler:\n  scan_interval_secs: 30\n",
        )
        .unwrap();

        let config = DaemonConfig::load(Some(&path)).unwrap();
        assert_eq!(config.registry.manifest_path, PathBuf::from("/srv/models.yaml"));
        assert_eq!(config.target.name_prefix, "team");
        assert_eq!(config.target.settle_time(), Duration::from_secs(3));
        assert_eq!(config.scheduler.interval(), Duration::from_secs(30));
        // Untouched keys keep their defaults.
        assert_eq!(config.target.region, "us-east-1");
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modelsync.yaml");
        std::fs::write(&path, "target:\n  kind: mainframe\n").unwrap();

        let err = DaemonConfig::load(Some(&path)).unwrap_err();
        assert!(matches!(err, DaemonError::Config(_)));
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let mut config = DaemonConfig::default();
        config.scheduler.scan_interval_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_endpoint_target_settings() {
        let target = TargetConfig {
            name_prefix: "team".into(),
            initial_instance_count: 2,
            ..Default::default()
        };
        let settings = target.endpoint_target();
        assert_eq!(settings.name_prefix, "team");
        assert_eq!(settings.initial_instance_count, 2);
        assert_eq!(settings.bucket(), "modelsync-models-000000000000-us-east-1");
        assert_eq!(settings.teardown_timeout_secs, 1200);
        assert_eq!(settings.teardown_poll_secs, 30);
    }

    #[test]
    fn test_teardown_settings_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modelsync.yaml");
        std::fs::write(
            &path,
            "target:\n  teardown_timeout_secs: 90\n  teardown_poll_secs: 3\n",
        )
        .unwrap();

        let settings = DaemonConfig::load(Some(&path)).unwrap().target.endpoint_target();
        assert_eq!(settings.teardown_timeout_secs, 90);
        assert_eq!(settings.teardown_poll_secs, 3);
    }

    #[test]
    fn test_zero_teardown_poll_is_rejected() {
        let mut config = DaemonConfig::default();
        config.target.teardown_poll_secs = 0;
        assert!(config.validate().is_err());
    }
}
