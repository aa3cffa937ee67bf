//! modelsync Deploy - Actual state and change execution
//!
//! Deploy targets report what is currently being served and converge it
//! towards the registry's bindings.
//!
//! ## Architectural Boundaries
//!
//! - `modelsync-registry` owns: desired state and artifacts
//! - `modelsync-deploy` owns: routing diff, endpoint lifecycle, per-version resources
//! - `modelsync-daemon` owns: when reconciliation runs
//!
//! ## Key Principle
//!
//! The platform changes endpoint status on its own schedule. Nothing here
//! waits for a transition to finish during reconciliation: an endpoint that
//! cannot be changed right now is deferred and revisited on the next tick.
//!
//! ## Usage
//!
//! ```no_run
//! use modelsync_deploy::{
//!     DeployTarget, EndpointDeployTarget, EndpointTargetConfig, FsArtifactStore, SimulatedPlatform,
//! };
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EndpointTargetConfig::default();
//! let platform = Arc::new(SimulatedPlatform::new(&config.region, &config.account_id));
//! let store = Arc::new(FsArtifactStore::new("/var/lib/modelsync/objects"));
//! let target = EndpointDeployTarget::new(config, platform, store);
//!
//! target.init().await?;
//! let live = target.list_models().await?;
//! # let _ = live;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod endpoint;
pub mod error;
pub mod ledger;
pub mod naming;
pub mod platform;
pub mod routing;
pub mod simulated;
pub mod store;
pub mod target;

// Re-exports
pub use endpoint::{plan_update, EndpointLifecycle, EndpointOutcome, EndpointPlan, VariantSettings};
pub use error::{DeployError, PlatformError, ResourceKind, Result, StoreError};
pub use ledger::EndpointLedger;
pub use naming::Naming;
pub use platform::{
    EndpointConfig, EndpointDescription, EndpointPlatform, EndpointSummary, ModelResource,
    ProductionVariant,
};
pub use routing::diff;
pub use simulated::{PlatformCall, PlatformOp, SimulatedPlatform};
pub use store::{ArtifactStore, FsArtifactStore};
pub use target::{DeployTarget, EndpointDeployTarget, EndpointTargetConfig, StageReport};
