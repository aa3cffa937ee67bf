//! Serving platform abstraction
//!
//! The calls a managed model-serving platform exposes for endpoints, endpoint
//! configurations, model resources and the execution role they run under.
//! Endpoint status transitions happen asynchronously on the platform side;
//! callers only ever observe snapshots.

use crate::error::PlatformResult;
use async_trait::async_trait;
use modelsync_types::EndpointStatus;
use serde::{Deserialize, Serialize};

/// One traffic share of an endpoint, served by one model resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductionVariant {
    pub variant_name: String,
    pub model_name: String,
    pub initial_instance_count: u32,
    pub instance_type: String,
    pub initial_weight: f32,
}

/// Named, immutable description of the variants an endpoint serves
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub name: String,
    pub variants: Vec<ProductionVariant>,
}

/// Endpoint as listed by the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointSummary {
    pub name: String,
    pub status: EndpointStatus,
}

/// Endpoint as described by the platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointDescription {
    pub name: String,
    pub config_name: String,
    pub status: EndpointStatus,
    pub failure_reason: Option<String>,
    /// Model resources behind the variants the endpoint currently runs
    pub variant_models: Vec<String>,
}

/// Per-version model resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelResource {
    pub name: String,
    /// Where the packaged artifact was uploaded
    pub artifact_url: String,
    pub execution_role_arn: String,
}

/// Managed model-serving platform
#[async_trait]
pub trait EndpointPlatform: Send + Sync {
    /// Endpoints whose name contains `name_contains`, optionally filtered by status
    ///
    /// Matching is by substring, as on the real platform. Callers that need a
    /// prefix match filter the result themselves.
    async fn list_endpoints(
        &self,
        name_contains: &str,
        status: Option<&EndpointStatus>,
    ) -> PlatformResult<Vec<EndpointSummary>>;

    async fn describe_endpoint(&self, name: &str) -> PlatformResult<EndpointDescription>;

    async fn describe_endpoint_config(&self, name: &str) -> PlatformResult<EndpointConfig>;

    async fn list_endpoint_configs(&self, name_contains: &str) -> PlatformResult<Vec<String>>;

    async fn create_endpoint_config(&self, config: EndpointConfig) -> PlatformResult<()>;

    async fn delete_endpoint_config(&self, name: &str) -> PlatformResult<()>;

    async fn create_endpoint(&self, name: &str, config_name: &str) -> PlatformResult<()>;

    /// Point an endpoint at a new config
    ///
    /// With `retain_all_variant_properties` unset, variant weights and
    /// instance settings come entirely from the new config.
    async fn update_endpoint(
        &self,
        name: &str,
        config_name: &str,
        retain_all_variant_properties: bool,
    ) -> PlatformResult<()>;

    async fn delete_endpoint(&self, name: &str) -> PlatformResult<()>;

    async fn create_model(&self, model: ModelResource) -> PlatformResult<()>;

    async fn delete_model(&self, name: &str) -> PlatformResult<()>;

    async fn list_models(&self, name_contains: &str) -> PlatformResult<Vec<String>>;

    /// Create the execution role if missing and return its ARN
    async fn ensure_execution_role(&self, role: &str) -> PlatformResult<String>;

    async fn delete_execution_role(&self, role: &str) -> PlatformResult<()>;

    /// Invocation URL of an endpoint
    fn endpoint_url(&self, name: &str) -> String;
}
