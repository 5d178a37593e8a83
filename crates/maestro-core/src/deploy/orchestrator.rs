//! One deployment, end to end.
//!
//! Resolves the mode, pushes the definition (inline script or uploaded
//! bundle), creates or updates the agent, and records the outcome in the
//! project state. A failed agent step never rolls back the definition:
//! the definition is persisted and the agent failure reported alongside it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::api::models::PYTHON_DEFINITION_TYPE;
use crate::api::{
    Agent, AgentApi, AgentCreate, AgentDefinition, AgentDefinitionCreate, AgentUpdate,
    BundleUpdate, BundleUpload, JsonMap,
};
use crate::bundle::{BundleManifest, BundleOptions, BundlePackager, BundleReport};
use crate::error::{IoResultExt, MaestroError, Result};
use crate::state::{ProjectState, ProjectStateStore};

use super::resolver::{DeployMode, DeployModeResolver, Resolution};
use super::schemas::{Schemas, load_schemas};

/// Agent type used when none is given.
pub const DEFAULT_AGENT_TYPE: &str = "script";

/// What is being deployed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeploySource {
    /// A single `.py` file sent inline.
    Script(PathBuf),
    /// A directory packaged as a bundle.
    Bundle(PathBuf),
}

impl DeploySource {
    pub fn from_path(path: &Path) -> Result<Self> {
        if path.is_dir() {
            return Ok(Self::Bundle(path.to_path_buf()));
        }
        if !path.exists() {
            return Err(MaestroError::invalid_input(format!(
                "Path '{}' does not exist.",
                path.display()
            )));
        }
        let is_python = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == "py");
        if !path.is_file() || !is_python {
            return Err(MaestroError::invalid_input(
                "File path must be a Python file (.py) or a directory.",
            ));
        }
        Ok(Self::Script(path.to_path_buf()))
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::Script(p) | Self::Bundle(p) => p,
        }
    }

    /// Directory holding the project state for this source.
    pub fn project_dir(&self) -> PathBuf {
        match self {
            Self::Bundle(dir) => dir.clone(),
            Self::Script(file) => file
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }

    /// File stem of a script, or the directory name of a bundle.
    pub fn default_name(&self) -> Option<String> {
        let name = match self {
            Self::Script(file) => file.file_stem(),
            Self::Bundle(dir) => dir.file_name(),
        };
        name.map(|n| n.to_string_lossy().into_owned())
    }

    pub fn is_bundle(&self) -> bool {
        matches!(self, Self::Bundle(_))
    }
}

/// Options for a deployment.
#[derive(Debug, Clone)]
pub struct DeployOptions {
    name: Option<String>,
    description: Option<String>,
    agent_type: String,
    mode: Option<DeployMode>,
    create_agent: bool,
    schema_file: Option<PathBuf>,
    env: JsonMap,
    install_dependencies: bool,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            name: None,
            description: None,
            agent_type: DEFAULT_AGENT_TYPE.to_string(),
            mode: None,
            create_agent: true,
            schema_file: None,
            env: JsonMap::new(),
            install_dependencies: true,
        }
    }
}

impl DeployOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_agent_type(mut self, agent_type: impl Into<String>) -> Self {
        self.agent_type = agent_type.into();
        self
    }

    /// Force a mode instead of detecting one.
    pub fn with_mode(mut self, mode: DeployMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Whether to create or update an agent bound to the definition.
    pub fn with_create_agent(mut self, create_agent: bool) -> Self {
        self.create_agent = create_agent;
        self
    }

    pub fn with_schema_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.schema_file = Some(path.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env
            .insert(key.into(), serde_json::Value::String(value.into()));
        self
    }

    pub fn with_install_dependencies(mut self, install: bool) -> Self {
        self.install_dependencies = install;
        self
    }

    fn env_map(&self) -> Option<JsonMap> {
        (!self.env.is_empty()).then(|| self.env.clone())
    }
}

/// Outcome of a deployment whose definition step succeeded.
#[derive(Debug)]
pub struct DeployReport {
    pub agent_name: String,
    pub mode: DeployMode,
    pub definition: AgentDefinition,
    pub agent: Option<Agent>,
    /// Agent step failure; the definition change stands.
    pub instance_error: Option<MaestroError>,
    /// Packaging summary for bundle deployments. The archive itself is gone.
    pub bundle: Option<BundleReport>,
    pub warnings: Vec<String>,
    pub state_path: PathBuf,
}

impl DeployReport {
    pub fn is_complete(&self) -> bool {
        self.instance_error.is_none()
    }
}

/// Runs deployments against an [`AgentApi`].
#[derive(Clone)]
pub struct DeploymentOrchestrator {
    api: Arc<dyn AgentApi>,
    packager: BundlePackager,
}

impl std::fmt::Debug for DeploymentOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentOrchestrator")
            .field("packager", &self.packager)
            .finish_non_exhaustive()
    }
}

impl DeploymentOrchestrator {
    pub fn new(api: Arc<dyn AgentApi>, packager: BundlePackager) -> Self {
        Self { api, packager }
    }

    /// Deploy the script or directory at `path`.
    pub async fn deploy(&self, path: &Path, options: &DeployOptions) -> Result<DeployReport> {
        let source = DeploySource::from_path(path)?;
        let agent_name = options
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .or_else(|| source.default_name())
            .ok_or_else(|| {
                MaestroError::invalid_input(format!(
                    "Cannot derive an agent name from '{}'; pass one explicitly",
                    path.display()
                ))
            })?;

        let store = ProjectStateStore::new(source.project_dir());
        let state = store.load();
        let resolution = DeployModeResolver::new(self.api.as_ref())
            .resolve(&agent_name, &state, options.mode)
            .await?;
        tracing::info!(
            name = %agent_name,
            mode = %resolution.mode,
            bundle = source.is_bundle(),
            "Deploying"
        );

        let loaded = load_schemas(source.path(), options.schema_file.as_deref());
        let mut warnings = loaded.warnings;

        let (definition, bundle) = match &source {
            DeploySource::Script(file) => {
                let definition = self
                    .push_script(file, &agent_name, options, &resolution, loaded.schemas)
                    .await?;
                (definition, None)
            }
            DeploySource::Bundle(dir) => {
                let (definition, bundle) = self
                    .push_bundle(dir, &agent_name, options, &resolution, loaded.schemas)
                    .await?;
                warnings.extend(bundle.warnings.iter().cloned());
                (definition, Some(bundle))
            }
        };

        // Scripts carry env on the definition; bundles pass it to the agent.
        let secrets = if source.is_bundle() {
            options.env_map()
        } else {
            None
        };
        let (agent, instance_error) = if options.create_agent {
            match self
                .push_agent(&agent_name, options, &resolution, &definition, secrets)
                .await
            {
                Ok(agent) => (Some(agent), None),
                Err(e) => {
                    tracing::warn!(error = %e, "Agent step failed; definition change is kept");
                    (None, Some(e))
                }
            }
        } else {
            (None, None)
        };

        // A failed agent step keeps whatever agent was already known.
        let agent_id = match (&agent, &instance_error) {
            (Some(agent), _) => Some(agent.id),
            (None, Some(_)) => resolution.agent.as_ref().map(|a| a.id),
            (None, None) => None,
        };
        store.save(&ProjectState::deployed(
            agent_name.clone(),
            definition.id,
            agent_id,
            resolution.mode,
        ))?;

        Ok(DeployReport {
            agent_name,
            mode: resolution.mode,
            definition,
            agent,
            instance_error,
            bundle,
            warnings,
            state_path: store.state_path(),
        })
    }

    async fn push_script(
        &self,
        file: &Path,
        name: &str,
        options: &DeployOptions,
        resolution: &Resolution,
        schemas: Schemas,
    ) -> Result<AgentDefinition> {
        let code = std::fs::read_to_string(file).at_path("Error reading file", file)?;
        let payload = AgentDefinitionCreate {
            name: name.to_string(),
            description: options.description.clone(),
            definition: Some(code),
            definition_type: Some(PYTHON_DEFINITION_TYPE.to_string()),
            input_schema: schemas.input,
            output_schema: schemas.output,
            memory_template: schemas.memory,
            environment_variables: options.env_map(),
        };

        match resolution.mode {
            DeployMode::Create => {
                let created = self.api.create_definition(&payload).await?;
                tracing::info!(id = %created.id, "Created agent definition '{}'", created.name);
                Ok(created)
            }
            DeployMode::Update | DeployMode::Redeploy => {
                let existing = existing_definition(resolution)?;
                let updated = self
                    .api
                    .update_definition(existing.id, &payload.merged_over(existing))
                    .await?;
                tracing::info!(
                    id = %updated.id,
                    mode = %resolution.mode,
                    "Updated agent definition '{}'",
                    updated.name
                );
                Ok(updated)
            }
        }
    }

    async fn push_bundle(
        &self,
        dir: &Path,
        name: &str,
        options: &DeployOptions,
        resolution: &Resolution,
        schemas: Schemas,
    ) -> Result<(AgentDefinition, BundleReport)> {
        let shipped = BundleManifest::load_from_dir(dir);
        let mut synthesized = BundleManifest::default();
        if let Some(description) = &options.description {
            synthesized = synthesized.with_description(description.clone());
        }
        let manifest = shipped.unwrap_or_else(|| synthesized.clone());

        let bundle_options = BundleOptions::new()
            .with_install_dependencies(options.install_dependencies)
            .with_manifest(synthesized);
        let bundle = self.packager.package(dir, &bundle_options).await?;

        let pushed = match resolution.mode {
            DeployMode::Create => {
                let upload = BundleUpload {
                    description: options.description.clone(),
                    input_schema: schemas.input,
                    output_schema: schemas.output,
                    entrypoint: manifest.entrypoint,
                    version: manifest.version,
                    requirements: bundle.requirements.clone(),
                    ..BundleUpload::new(name)
                };
                self.api.upload_bundle(&bundle.path, &upload).await
            }
            DeployMode::Update | DeployMode::Redeploy => match existing_definition(resolution) {
                Ok(existing) => {
                    let update = BundleUpdate {
                        entrypoint: Some(manifest.entrypoint),
                        version: Some(manifest.version),
                        requirements: bundle.requirements.clone(),
                        additional_metadata: None,
                    };
                    self.api
                        .update_bundle(existing.id, &bundle.path, &update)
                        .await
                }
                Err(e) => Err(e),
            },
        };
        // The archive only lives for the upload.
        bundle.cleanup();

        let definition = pushed?;
        tracing::info!(
            id = %definition.id,
            mode = %resolution.mode,
            "Deployed bundle definition '{}'",
            definition.name
        );
        Ok((definition, bundle))
    }

    async fn push_agent(
        &self,
        name: &str,
        options: &DeployOptions,
        resolution: &Resolution,
        definition: &AgentDefinition,
        secrets: Option<JsonMap>,
    ) -> Result<Agent> {
        match (resolution.mode, &resolution.agent) {
            (DeployMode::Update, Some(existing)) => {
                let update = AgentUpdate {
                    name: Some(name.to_string()),
                    description: options
                        .description
                        .clone()
                        .or_else(|| existing.description.clone()),
                    agent_type: Some(options.agent_type.clone()),
                    agent_definition_id: Some(definition.id),
                    capabilities: existing.capabilities.clone(),
                    agent_metadata: existing.agent_metadata.clone(),
                    secrets,
                };
                let agent = self.api.update_agent(existing.id, &update).await?;
                tracing::info!(id = %agent.id, "Updated agent '{}'", agent.name);
                Ok(agent)
            }
            _ => {
                let create = AgentCreate {
                    name: name.to_string(),
                    description: options.description.clone(),
                    agent_type: options.agent_type.clone(),
                    agent_definition_id: definition.id,
                    secrets,
                    ..Default::default()
                };
                let agent = self.api.create_agent(&create).await?;
                tracing::info!(
                    id = %agent.id,
                    definition = %definition.id,
                    "Created agent '{}'",
                    agent.name
                );
                Ok(agent)
            }
        }
    }
}

fn existing_definition(resolution: &Resolution) -> Result<&AgentDefinition> {
    resolution.definition.as_ref().ok_or_else(|| {
        MaestroError::invalid_input(format!(
            "Cannot {}: no existing agent definition",
            resolution.mode
        ))
    })
}
