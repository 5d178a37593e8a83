//! Agent definition and agent endpoints.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::config::DEFAULT_UPLOAD_TIMEOUT;
use crate::error::{MaestroError, Result};
use crate::http::{ApiRequest, FilePart, RequestDispatcher};

use super::AgentApi;
use super::models::{
    Agent, AgentCreate, AgentDefinition, AgentDefinitionCreate, AgentUpdate, BundleUpdate,
    BundleUpload, JsonMap,
};

const DEFINITIONS_PATH: &str = "/api/v1/agents/agent-definitions/";
const DEFINITION_PATH: &str = "/api/v1/agents/agent-definitions/{definition_id}";
const DEFINITION_BUNDLE_UPLOAD_PATH: &str = "/api/v1/agents/agent-definitions/bundle/";
const DEFINITION_BUNDLE_PATH: &str = "/api/v1/agents/agent-definitions/{definition_id}/bundle";
const AGENTS_PATH: &str = "/api/v1/agents/";
const AGENT_PATH: &str = "/api/v1/agents/{agent_id}";
const EXECUTE_SYNC_PATH: &str = "/api/v1/agents/run/{agent_id}/execute-sync";

const ZIP_MIME: &str = "application/zip";

/// Agent operations backed by a [`RequestDispatcher`].
#[derive(Debug, Clone)]
pub struct AgentResource {
    http: Arc<RequestDispatcher>,
    upload_timeout: Duration,
}

impl AgentResource {
    pub fn new(http: Arc<RequestDispatcher>) -> Self {
        Self {
            http,
            upload_timeout: DEFAULT_UPLOAD_TIMEOUT,
        }
    }

    pub fn with_upload_timeout(mut self, timeout: Duration) -> Self {
        self.upload_timeout = timeout;
        self
    }

    /// Download the bundle archive attached to a definition.
    pub async fn download_definition_bundle(&self, definition_id: Uuid) -> Result<Vec<u8>> {
        self.http
            .fetch_bytes(
                ApiRequest::get(DEFINITION_BUNDLE_PATH).path_param("definition_id", definition_id),
            )
            .await
    }

    /// Run an agent synchronously and return the raw execution record.
    pub async fn execute_agent_sync(
        &self,
        agent_id: Uuid,
        variables: JsonMap,
        executor_type: Option<&str>,
    ) -> Result<Value> {
        let request = ApiRequest::post(EXECUTE_SYNC_PATH)
            .path_param("agent_id", agent_id)
            .query_opt("executor_type", executor_type)
            .json(json!({ "input_variables": { "variables": variables } }));
        self.http.fetch_value(request).await
    }
}

#[async_trait]
impl AgentApi for AgentResource {
    async fn create_definition(&self, data: &AgentDefinitionCreate) -> Result<AgentDefinition> {
        let request = ApiRequest::post(DEFINITIONS_PATH)
            .json(json!({ "agent_definition_data": to_json(data)? }));
        self.http.fetch_one(request).await
    }

    async fn list_definitions(&self, name: Option<&str>) -> Result<Vec<AgentDefinition>> {
        let request = ApiRequest::get(DEFINITIONS_PATH).query_opt("name", name);
        self.http.fetch_list(request).await
    }

    async fn get_definition(&self, definition_id: Uuid) -> Result<AgentDefinition> {
        let request = ApiRequest::get(DEFINITION_PATH).path_param("definition_id", definition_id);
        self.http.fetch_one(request).await
    }

    async fn update_definition(
        &self,
        definition_id: Uuid,
        data: &AgentDefinitionCreate,
    ) -> Result<AgentDefinition> {
        let request = ApiRequest::put(DEFINITION_PATH)
            .path_param("definition_id", definition_id)
            .json(json!({ "update_data": to_json(data)? }));
        self.http.fetch_one(request).await
    }

    async fn create_agent(&self, data: &AgentCreate) -> Result<Agent> {
        let request = ApiRequest::post(AGENTS_PATH).json(json!({ "agent_data": to_json(data)? }));
        self.http.fetch_one(request).await
    }

    async fn list_agents(&self, name: Option<&str>) -> Result<Vec<Agent>> {
        let request = ApiRequest::get(AGENTS_PATH).query_opt("name", name);
        self.http.fetch_list(request).await
    }

    async fn get_agent(&self, agent_id: Uuid) -> Result<Agent> {
        let request = ApiRequest::get(AGENT_PATH).path_param("agent_id", agent_id);
        self.http.fetch_one(request).await
    }

    async fn update_agent(&self, agent_id: Uuid, data: &AgentUpdate) -> Result<Agent> {
        let request = ApiRequest::put(AGENT_PATH)
            .path_param("agent_id", agent_id)
            .json(json!({ "update_data": to_json(data)? }));
        self.http.fetch_one(request).await
    }

    async fn upload_bundle(&self, bundle: &Path, meta: &BundleUpload) -> Result<AgentDefinition> {
        ensure_zip_file(bundle)?;
        let request = with_fields(
            ApiRequest::post(DEFINITION_BUNDLE_UPLOAD_PATH)
                .file(FilePart::from_path("bundle", bundle, ZIP_MIME))
                .timeout(self.upload_timeout),
            meta.fields(),
        );
        self.http.fetch_one(request).await
    }

    async fn update_bundle(
        &self,
        definition_id: Uuid,
        bundle: &Path,
        meta: &BundleUpdate,
    ) -> Result<AgentDefinition> {
        ensure_zip_file(bundle)?;
        let request = with_fields(
            ApiRequest::put(DEFINITION_BUNDLE_PATH)
                .path_param("definition_id", definition_id)
                .file(FilePart::from_path("bundle", bundle, ZIP_MIME))
                .timeout(self.upload_timeout),
            meta.fields(),
        );
        self.http.fetch_one(request).await
    }
}

fn with_fields(request: ApiRequest, fields: Vec<(String, String)>) -> ApiRequest {
    fields
        .into_iter()
        .fold(request, |req, (name, value)| req.form_field(name, value))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| {
        MaestroError::invalid_input(format!("Failed to serialize request body: {}", e))
    })
}

/// Reject bundle paths that are missing, not files, or not `.zip` archives.
fn ensure_zip_file(path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(MaestroError::invalid_input(format!(
            "Bundle file '{}' does not exist or is not a file",
            path.display()
        )));
    }
    let is_zip = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("zip"));
    if !is_zip {
        return Err(MaestroError::invalid_input(format!(
            "Bundle file must be a ZIP file: {}",
            path.display()
        )));
    }
    Ok(())
}
