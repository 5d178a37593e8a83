//! In-memory agent service for resolver and orchestrator tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use maestro_core::api::{
    Agent, AgentApi, AgentCreate, AgentDefinition, AgentDefinitionCreate, AgentUpdate,
    BundleUpdate, BundleUpload,
};
use maestro_core::{MaestroError, Result};
use serde_json::json;
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct FakeState {
    pub definitions: Vec<AgentDefinition>,
    pub agents: Vec<Agent>,
    pub calls: Vec<String>,
    pub uploaded_entries: Vec<String>,
    pub uploads: Vec<Vec<(String, String)>>,
    pub fail_agent_writes: bool,
    pub reject_auth: bool,
}

/// Service double backed by two vectors, returned in insertion order.
#[derive(Debug, Default)]
pub struct FakeApi {
    state: Mutex<FakeState>,
}

pub fn definition(name: &str) -> AgentDefinition {
    serde_json::from_value(json!({ "id": Uuid::new_v4(), "name": name }))
        .expect("valid definition")
}

pub fn agent(name: &str, definition_id: Uuid) -> Agent {
    serde_json::from_value(json!({
        "id": Uuid::new_v4(),
        "name": name,
        "agent_type": "script",
        "agent_definition_id": definition_id,
    }))
    .expect("valid agent")
}

fn not_found(what: &str) -> MaestroError {
    MaestroError::Api {
        status: 404,
        detail: json!({ "detail": format!("{} not found", what) }),
    }
}

impl FakeApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake state lock")
    }

    pub fn add_definition(&self, name: &str) -> AgentDefinition {
        let def = definition(name);
        self.state().definitions.push(def.clone());
        def
    }

    pub fn add_agent(&self, name: &str, definition_id: Uuid) -> Agent {
        let agent = agent(name, definition_id);
        self.state().agents.push(agent.clone());
        agent
    }

    pub fn remove_agent(&self, id: Uuid) {
        self.state().agents.retain(|a| a.id != id);
    }

    pub fn remove_definition(&self, id: Uuid) {
        self.state().definitions.retain(|d| d.id != id);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    pub fn fail_agent_writes(&self, fail: bool) {
        self.state().fail_agent_writes = fail;
    }

    pub fn reject_auth(&self, reject: bool) {
        self.state().reject_auth = reject;
    }

    fn record(&self, call: &str) -> Result<MutexGuard<'_, FakeState>> {
        let mut state = self.state();
        state.calls.push(call.to_string());
        if state.reject_auth {
            return Err(MaestroError::Auth {
                status: 401,
                detail: json!({ "detail": "Invalid token" }),
            });
        }
        Ok(state)
    }

    fn store_definition(&self, id: Uuid, data: &AgentDefinitionCreate) -> Result<AgentDefinition> {
        let mut state = self.state();
        let mut value = serde_json::to_value(data).expect("serializable payload");
        value["id"] = json!(id);
        let def: AgentDefinition = serde_json::from_value(value).expect("valid definition");
        state.definitions.retain(|d| d.id != id);
        state.definitions.push(def.clone());
        Ok(def)
    }
}

fn zip_entries(path: &Path) -> Vec<String> {
    let file = std::fs::File::open(path).expect("bundle exists during upload");
    let archive = zip::ZipArchive::new(file).expect("valid zip");
    archive.file_names().map(String::from).collect()
}

#[async_trait]
impl AgentApi for FakeApi {
    async fn create_definition(&self, data: &AgentDefinitionCreate) -> Result<AgentDefinition> {
        drop(self.record("create_definition")?);
        self.store_definition(Uuid::new_v4(), data)
    }

    async fn list_definitions(&self, name: Option<&str>) -> Result<Vec<AgentDefinition>> {
        let state = self.record("list_definitions")?;
        Ok(state
            .definitions
            .iter()
            .filter(|d| name.is_none_or(|n| d.name == n))
            .cloned()
            .collect())
    }

    async fn get_definition(&self, definition_id: Uuid) -> Result<AgentDefinition> {
        let state = self.record("get_definition")?;
        state
            .definitions
            .iter()
            .find(|d| d.id == definition_id)
            .cloned()
            .ok_or_else(|| not_found("Agent definition"))
    }

    async fn update_definition(
        &self,
        definition_id: Uuid,
        data: &AgentDefinitionCreate,
    ) -> Result<AgentDefinition> {
        let exists = {
            let state = self.record("update_definition")?;
            state.definitions.iter().any(|d| d.id == definition_id)
        };
        if !exists {
            return Err(not_found("Agent definition"));
        }
        self.store_definition(definition_id, data)
    }

    async fn create_agent(&self, data: &AgentCreate) -> Result<Agent> {
        let mut state = self.record("create_agent")?;
        if state.fail_agent_writes {
            return Err(MaestroError::Api {
                status: 500,
                detail: json!("Internal Server Error"),
            });
        }
        let mut created = agent(&data.name, data.agent_definition_id);
        created.description = data.description.clone();
        created.agent_type = Some(data.agent_type.clone());
        state.agents.push(created.clone());
        Ok(created)
    }

    async fn list_agents(&self, name: Option<&str>) -> Result<Vec<Agent>> {
        let state = self.record("list_agents")?;
        Ok(state
            .agents
            .iter()
            .filter(|a| name.is_none_or(|n| a.name == n))
            .cloned()
            .collect())
    }

    async fn get_agent(&self, agent_id: Uuid) -> Result<Agent> {
        let state = self.record("get_agent")?;
        state
            .agents
            .iter()
            .find(|a| a.id == agent_id)
            .cloned()
            .ok_or_else(|| not_found("Agent"))
    }

    async fn update_agent(&self, agent_id: Uuid, data: &AgentUpdate) -> Result<Agent> {
        let mut state = self.record("update_agent")?;
        if state.fail_agent_writes {
            return Err(MaestroError::Validation {
                status: 422,
                detail: json!({ "detail": [{ "msg": "bad agent" }] }),
            });
        }
        let agent = state
            .agents
            .iter_mut()
            .find(|a| a.id == agent_id)
            .ok_or_else(|| not_found("Agent"))?;
        if let Some(name) = &data.name {
            agent.name = name.clone();
        }
        if data.description.is_some() {
            agent.description = data.description.clone();
        }
        if data.agent_definition_id.is_some() {
            agent.agent_definition_id = data.agent_definition_id;
        }
        Ok(agent.clone())
    }

    async fn upload_bundle(&self, bundle: &Path, meta: &BundleUpload) -> Result<AgentDefinition> {
        {
            let mut state = self.record("upload_bundle")?;
            state.uploaded_entries = zip_entries(bundle);
            state.uploads.push(meta.fields());
        }
        self.store_definition(
            Uuid::new_v4(),
            &AgentDefinitionCreate {
                name: meta.name.clone(),
                description: meta.description.clone(),
                ..Default::default()
            },
        )
    }

    async fn update_bundle(
        &self,
        definition_id: Uuid,
        bundle: &Path,
        meta: &BundleUpdate,
    ) -> Result<AgentDefinition> {
        let mut state = self.record("update_bundle")?;
        state.uploaded_entries = zip_entries(bundle);
        state.uploads.push(meta.fields());
        state
            .definitions
            .iter()
            .find(|d| d.id == definition_id)
            .cloned()
            .ok_or_else(|| not_found("Agent definition"))
    }
}
