//! modelsync Registry - Desired state sources
//!
//! This crate provides the registry side of reconciliation:
//!
//! - **ModelRegistry**: lists stage bindings and fetches version artifacts
//! - **ArtifactCache**: on-disk cache of packaged artifacts keyed by model and version
//! - **TagBook**: records which versions are deployed and where
//!
//! ## Implementations
//!
//! - [`ManifestRegistry`] reads bindings from a YAML manifest on every call
//! - [`InMemoryRegistry`] is programmable and intended for development and tests
//!
//! Registries backed by a remote service implement the same trait.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod cache;
pub mod error;
pub mod manifest;
pub mod memory;
pub mod registry;
pub mod tags;

// Re-exports
pub use cache::ArtifactCache;
pub use error::{RegistryError, Result};
pub use manifest::{Manifest, ManifestEntry, ManifestRegistry, ManifestVersion};
pub use memory::InMemoryRegistry;
pub use registry::ModelRegistry;
pub use tags::TagBook;
