//! Deployment status for a project directory.
//!
//! Combines the local state record with what the service currently reports
//! for the stored identifiers, plus a service health check.

use std::path::PathBuf;

use serde::Serialize;
use uuid::Uuid;

use crate::api::{AgentApi, UtilsResource};
use crate::error::Result;
use crate::state::{ProjectState, ProjectStateStore};

// =============================================================================
// Data Structures
// =============================================================================

/// Whether a stored identifier still resolves remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteState {
    /// No identifier stored.
    NotRecorded,
    Exists,
    Missing,
}

/// Local state plus remote existence checks.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub state_path: PathBuf,
    pub state: ProjectState,
    pub definition: RemoteState,
    pub agent: RemoteState,
    pub service_healthy: bool,
}

impl StatusReport {
    pub fn has_state(&self) -> bool {
        !self.state.is_empty()
    }
}

// =============================================================================
// Collection
// =============================================================================

/// Collect the status of the project behind `store`.
///
/// Lookups that do not resolve are reported as [`RemoteState::Missing`];
/// authentication and transport failures propagate.
pub async fn collect_status(
    store: &ProjectStateStore,
    api: &dyn AgentApi,
    utils: &UtilsResource,
) -> Result<StatusReport> {
    let state = store.load();
    let definition = check(state.agent_definition_id, |id| async move {
        api.get_definition(id).await.map(|_| ())
    })
    .await?;
    let agent = check(state.agent_id, |id| async move {
        api.get_agent(id).await.map(|_| ())
    })
    .await?;
    let service_healthy = utils.health_check().await;

    Ok(StatusReport {
        state_path: store.state_path(),
        state,
        definition,
        agent,
        service_healthy,
    })
}

async fn check<F, Fut>(id: Option<Uuid>, lookup: F) -> Result<RemoteState>
where
    F: FnOnce(Uuid) -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    let Some(id) = id else {
        return Ok(RemoteState::NotRecorded);
    };
    match lookup(id).await {
        Ok(()) => Ok(RemoteState::Exists),
        Err(e) if e.is_unresolved() => Ok(RemoteState::Missing),
        Err(e) => Err(e),
    }
}
