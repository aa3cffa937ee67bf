//! Deploy error types

use modelsync_types::EndpointStatus;
use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by a serving platform
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlatformError {
    #[error("{kind} not found: {name}")]
    NotFound { kind: ResourceKind, name: String },

    #[error("{kind} already exists: {name}")]
    AlreadyExists { kind: ResourceKind, name: String },

    #[error("Endpoint {name} cannot be modified in status {status}")]
    InvalidState { name: String, status: EndpointStatus },

    #[error("Request throttled: {0}")]
    Throttled(String),

    #[error("Platform unavailable: {0}")]
    Unavailable(String),

    #[error("Validation failed: {0}")]
    Validation(String),
}

impl PlatformError {
    pub fn not_found(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn already_exists(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind,
            name: name.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

/// Platform resource kinds, for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Endpoint,
    EndpointConfig,
    Model,
    Role,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            Self::Endpoint => "Endpoint",
            Self::EndpointConfig => "Endpoint config",
            Self::Model => "Model",
            Self::Role => "Execution role",
        };
        f.write_str(kind)
    }
}

/// Artifact store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Bucket not found: {0}")]
    NoSuchBucket(String),

    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::NoSuchBucket(_))
    }
}

/// Deploy target errors
#[derive(Debug, Error)]
pub enum DeployError {
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Artifact store error: {0}")]
    Store(#[from] StoreError),

    #[error("Teardown timed out waiting for endpoints: {0:?}")]
    TeardownTimeout(Vec<String>),
}

/// Result type for platform calls
pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

/// Result type for artifact store calls
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type for deploy target operations
pub type Result<T> = std::result::Result<T, DeployError>;
