//! Per-directory deployment state.
//!
//! Each project directory carries a small `.maestro_state.json` recording the
//! identifiers of the last successful deployment from that directory. The
//! record is advisory: a missing, unreadable or stale file never blocks a
//! deployment, it only makes the mode resolver fall back to a remote lookup.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::deploy::DeployMode;
use crate::error::{IoResultExt, MaestroError, Result};

/// File name of the state record inside a project directory.
pub const PROJECT_STATE_FILE: &str = ".maestro_state.json";

/// Last known remote identifiers for one project directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectState {
    #[serde(default)]
    pub agent_name: Option<String>,
    #[serde(default)]
    pub agent_definition_id: Option<Uuid>,
    #[serde(default)]
    pub agent_id: Option<Uuid>,
    #[serde(default)]
    pub last_deploy_mode: Option<DeployMode>,
    /// RFC 3339 timestamp of the last completed deployment.
    #[serde(default)]
    pub last_deployed_at: Option<String>,
}

impl ProjectState {
    /// Record of a deployment that just completed.
    pub fn deployed(
        agent_name: impl Into<String>,
        definition_id: Uuid,
        agent_id: Option<Uuid>,
        mode: DeployMode,
    ) -> Self {
        Self {
            agent_name: Some(agent_name.into()),
            agent_definition_id: Some(definition_id),
            agent_id,
            last_deploy_mode: Some(mode),
            last_deployed_at: Some(chrono::Utc::now().to_rfc3339()),
        }
    }

    /// The stored definition id, if this record describes `agent_name`.
    ///
    /// A record written for a different logical name is not applicable.
    pub fn definition_for(&self, agent_name: &str) -> Option<Uuid> {
        match self.agent_name.as_deref() {
            Some(stored) if stored == agent_name => self.agent_definition_id,
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Reads and writes [`ProjectState`] for one directory.
#[derive(Debug, Clone)]
pub struct ProjectStateStore {
    project_dir: PathBuf,
}

impl ProjectStateStore {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
        }
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn state_path(&self) -> PathBuf {
        self.project_dir.join(PROJECT_STATE_FILE)
    }

    /// Load the stored record.
    ///
    /// A missing file yields an empty record. An unreadable or corrupt file
    /// is logged and also yields an empty record.
    pub fn load(&self) -> ProjectState {
        let path = self.state_path();
        if !path.exists() {
            return ProjectState::default();
        }

        let parsed = fs::read(&path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| {
                serde_json::from_slice::<ProjectState>(&bytes).map_err(|e| e.to_string())
            });
        match parsed {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Ignoring unreadable project state"
                );
                ProjectState::default()
            }
        }
    }

    /// Overwrite the stored record atomically (tmp + rename).
    pub fn save(&self, state: &ProjectState) -> Result<()> {
        fs::create_dir_all(&self.project_dir)
            .at_path("Failed to create project directory:", &self.project_dir)?;

        let path = self.state_path();
        let tmp_path = self
            .project_dir
            .join(format!("{}.{}.tmp", PROJECT_STATE_FILE, std::process::id()));

        let bytes = serde_json::to_vec_pretty(state).map_err(|e| {
            MaestroError::invalid_input(format!("Failed to serialize project state: {}", e))
        })?;
        fs::write(&tmp_path, bytes).at_path("Failed to write project state:", &tmp_path)?;

        if path.exists() {
            fs::remove_file(&path).at_path("Failed to replace project state:", &path)?;
        }
        fs::rename(&tmp_path, &path).at_path("Failed to rename project state:", &tmp_path)?;

        tracing::debug!(path = %path.display(), "Saved project state");
        Ok(())
    }
}
