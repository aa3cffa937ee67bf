//! Registry error types

use std::path::PathBuf;
use thiserror::Error;

/// Registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Model version not found: {model}:{version}")]
    VersionNotFound { model: String, version: String },

    #[error("No MLmodel definition under {0}, cannot determine model root")]
    MissingModelRoot(PathBuf),

    #[error("Artifact source does not exist: {0}")]
    MissingSource(PathBuf),

    #[error("Invalid manifest {path}: {reason}")]
    InvalidManifest { path: PathBuf, reason: String },

    #[error("Packaging failed for {model}:{version}: {reason}")]
    Packaging {
        model: String,
        version: String,
        reason: String,
    },

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RegistryError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for registry operations
pub type Result<T> = std::result::Result<T, RegistryError>;
