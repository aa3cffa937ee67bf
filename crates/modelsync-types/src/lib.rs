//! modelsync Types - Core types for registry-to-endpoint reconciliation
//!
//! modelsync keeps model-serving endpoints on an ML platform converged with the
//! stage bindings declared in a model registry. This crate holds the shared
//! data model used by both sides of the comparison.
//!
//! ## Architectural Boundaries
//!
//! - **modelsync-registry** owns: desired state, artifact fetching and caching
//! - **modelsync-deploy** owns: actual state, routing diff, endpoint lifecycle
//! - **modelsync-daemon** owns: the reconciliation loop and configuration
//!
//! ## Key Concepts
//!
//! - **ModelVersion**: identity of a deployable unit, `(model_name, version_id)`
//! - **ModelEndpoint**: a version plus an optional serving location
//! - **Model**: stage label to set of versions
//! - **RoutingTable**: flattened `model -> stage -> version ids` projection for diffing
//! - **EndpointStatus**: observed lifecycle status of a platform endpoint

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod delta;
pub mod model;
pub mod routing;
pub mod status;
pub mod version;

// Re-export main types
pub use delta::VersionDelta;
pub use model::{Artifact, Model, ARCHIVED_STAGE, LATEST_STAGE};
pub use routing::{RoutingDiff, RoutingTable, StageBinding, StageKey};
pub use status::EndpointStatus;
pub use version::{ModelEndpoint, ModelVersion};
