//! Typed Maestro API resources.

pub mod agents;
pub mod models;

pub use agents::AgentResource;
pub use models::{
    Agent, AgentCreate, AgentDefinition, AgentDefinitionCreate, AgentUpdate, BundleUpdate,
    BundleUpload, JsonMap,
};

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use crate::error::Result;
use crate::http::{ApiRequest, RequestDispatcher};

const HEALTH_CHECK_PATH: &str = "/api/v1/utils/health-check/";

/// Agent operations the resolver and orchestrator depend on.
#[async_trait]
pub trait AgentApi: Send + Sync {
    async fn create_definition(&self, data: &AgentDefinitionCreate) -> Result<AgentDefinition>;

    /// Definitions in server order, optionally filtered by name.
    async fn list_definitions(&self, name: Option<&str>) -> Result<Vec<AgentDefinition>>;

    async fn get_definition(&self, definition_id: Uuid) -> Result<AgentDefinition>;

    /// Replace a definition wholesale.
    async fn update_definition(
        &self,
        definition_id: Uuid,
        data: &AgentDefinitionCreate,
    ) -> Result<AgentDefinition>;

    async fn create_agent(&self, data: &AgentCreate) -> Result<Agent>;

    /// Agents in server order, optionally filtered by name.
    async fn list_agents(&self, name: Option<&str>) -> Result<Vec<Agent>>;

    async fn get_agent(&self, agent_id: Uuid) -> Result<Agent>;

    async fn update_agent(&self, agent_id: Uuid, data: &AgentUpdate) -> Result<Agent>;

    /// Create a definition from a zip bundle.
    async fn upload_bundle(&self, bundle: &Path, meta: &BundleUpload) -> Result<AgentDefinition>;

    /// Replace the code of an existing definition with a new zip bundle.
    async fn update_bundle(
        &self,
        definition_id: Uuid,
        bundle: &Path,
        meta: &BundleUpdate,
    ) -> Result<AgentDefinition>;
}

/// Service utility endpoints.
#[derive(Debug, Clone)]
pub struct UtilsResource {
    http: Arc<RequestDispatcher>,
}

impl UtilsResource {
    pub fn new(http: Arc<RequestDispatcher>) -> Self {
        Self { http }
    }

    /// `true` when the service answers its health check with `true`.
    ///
    /// Any failure, including an unreachable service, reports unhealthy.
    pub async fn health_check(&self) -> bool {
        let request = ApiRequest::get(HEALTH_CHECK_PATH).unscoped();
        match self.http.fetch_text(request).await {
            Ok(body) => match serde_json::from_str::<Value>(&body) {
                Ok(value) => value == Value::Bool(true),
                Err(_) => body.trim().eq_ignore_ascii_case("true"),
            },
            Err(e) => {
                tracing::debug!(error = %e, "Health check failed");
                false
            }
        }
    }
}
