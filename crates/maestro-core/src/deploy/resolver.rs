//! Deployment mode resolution.
//!
//! Reconciles the local [`ProjectState`] with what the service reports and
//! picks one of create, update or redeploy. The decision only depends on the
//! state record and the service's answers, so re-running it against the
//! same environment always yields the same mode.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::{Agent, AgentApi, AgentDefinition};
use crate::error::{MaestroError, Result};
use crate::state::ProjectState;

/// Action taken by one deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployMode {
    /// No definition exists yet.
    Create,
    /// Definition and agent both exist.
    Update,
    /// Definition exists, its agent is gone.
    Redeploy,
}

impl DeployMode {
    pub const ALL: [DeployMode; 3] = [Self::Create, Self::Update, Self::Redeploy];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Redeploy => "redeploy",
        }
    }
}

impl fmt::Display for DeployMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeployMode {
    type Err = MaestroError;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| {
                MaestroError::invalid_input(format!(
                    "Invalid mode '{}'. Must be 'create', 'update', or 'redeploy'.",
                    s
                ))
            })
    }
}

/// What the mode decision was based on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionBasis {
    /// Operator supplied the mode.
    Override,
    /// Identifiers stored in the project state resolved remotely.
    State,
    /// Found by searching the service by name.
    NameLookup,
    /// Nothing found anywhere.
    Absent,
}

/// Outcome of mode resolution, with the remote records it found.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub mode: DeployMode,
    pub basis: ResolutionBasis,
    pub definition: Option<AgentDefinition>,
    pub agent: Option<Agent>,
}

impl Resolution {
    fn new(
        mode: DeployMode,
        basis: ResolutionBasis,
        definition: Option<AgentDefinition>,
        agent: Option<Agent>,
    ) -> Self {
        Self {
            mode,
            basis,
            definition,
            agent,
        }
    }
}

/// Picks the deployment mode for a logical agent name.
pub struct DeployModeResolver<'a> {
    api: &'a dyn AgentApi,
}

impl<'a> DeployModeResolver<'a> {
    pub fn new(api: &'a dyn AgentApi) -> Self {
        Self { api }
    }

    /// Resolve the mode for `name`.
    ///
    /// An override of `create` skips every lookup. An override of `update`
    /// or `redeploy` still needs the existing definition, so the lookups run
    /// and the override then replaces the detected mode; it is an input
    /// error if no definition exists.
    pub async fn resolve(
        &self,
        name: &str,
        state: &ProjectState,
        mode_override: Option<DeployMode>,
    ) -> Result<Resolution> {
        if mode_override == Some(DeployMode::Create) {
            return Ok(Resolution::new(
                DeployMode::Create,
                ResolutionBasis::Override,
                None,
                None,
            ));
        }

        let detected = self.detect(name, state).await?;
        let Some(mode) = mode_override else {
            tracing::info!(mode = %detected.mode, name, "Auto-detected deployment mode");
            return Ok(detected);
        };

        if detected.definition.is_none() {
            return Err(MaestroError::invalid_input(format!(
                "Cannot {} '{}': no existing agent definition was found",
                mode, name
            )));
        }
        tracing::info!(mode = %mode, detected = %detected.mode, name, "Using forced deployment mode");
        Ok(Resolution {
            mode,
            basis: ResolutionBasis::Override,
            ..detected
        })
    }

    async fn detect(&self, name: &str, state: &ProjectState) -> Result<Resolution> {
        if let Some(definition_id) = state.definition_for(name) {
            if let Some(definition) = self.lookup_definition(definition_id).await? {
                let agent = match state.agent_id {
                    Some(agent_id) => self
                        .lookup_agent(agent_id)
                        .await?
                        .filter(|agent| agent.is_bound_to(definition.id)),
                    None => None,
                };
                let mode = if agent.is_some() {
                    DeployMode::Update
                } else {
                    DeployMode::Redeploy
                };
                return Ok(Resolution::new(
                    mode,
                    ResolutionBasis::State,
                    Some(definition),
                    agent,
                ));
            }
            tracing::debug!(%definition_id, "Stored definition no longer resolves, searching by name");
        }

        let Some(definition) = self.find_definition(name).await? else {
            return Ok(Resolution::new(
                DeployMode::Create,
                ResolutionBasis::Absent,
                None,
                None,
            ));
        };
        let agent = self.find_agent(name, definition.id).await?;
        let mode = if agent.is_some() {
            DeployMode::Update
        } else {
            DeployMode::Redeploy
        };
        Ok(Resolution::new(
            mode,
            ResolutionBasis::NameLookup,
            Some(definition),
            agent,
        ))
    }

    async fn lookup_definition(&self, id: Uuid) -> Result<Option<AgentDefinition>> {
        absent_if_unresolved(self.api.get_definition(id).await)
    }

    async fn lookup_agent(&self, id: Uuid) -> Result<Option<Agent>> {
        absent_if_unresolved(self.api.get_agent(id).await)
    }

    async fn find_definition(&self, name: &str) -> Result<Option<AgentDefinition>> {
        let Some(found) = absent_if_unresolved(self.api.list_definitions(Some(name)).await)? else {
            return Ok(None);
        };
        let matches: Vec<AgentDefinition> = found.into_iter().filter(|d| d.name == name).collect();
        Ok(first_match("definition", name, matches, |d| d.id))
    }

    async fn find_agent(&self, name: &str, definition_id: Uuid) -> Result<Option<Agent>> {
        let Some(found) = absent_if_unresolved(self.api.list_agents(Some(name)).await)? else {
            return Ok(None);
        };
        let matches: Vec<Agent> = found
            .into_iter()
            .filter(|a| a.name == name && a.is_bound_to(definition_id))
            .collect();
        Ok(first_match("agent", name, matches, |a| a.id))
    }
}

/// Map "does not resolve" errors to `None`; everything else aborts.
fn absent_if_unresolved<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_unresolved() => {
            tracing::debug!(error = %e, "Lookup did not resolve");
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

/// First record in server order. Ambiguity is logged, not guessed at.
fn first_match<T>(kind: &str, name: &str, matches: Vec<T>, id: impl Fn(&T) -> Uuid) -> Option<T> {
    let count = matches.len();
    let first = matches.into_iter().next()?;
    if count > 1 {
        tracing::warn!(
            count,
            chosen = %id(&first),
            "Found {} {}s named '{}', using the first one returned",
            count,
            kind,
            name
        );
    }
    Some(first)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_closed_set() {
        assert_eq!("create".parse::<DeployMode>().unwrap(), DeployMode::Create);
        assert_eq!(" Update ".parse::<DeployMode>().unwrap(), DeployMode::Update);
        assert_eq!("REDEPLOY".parse::<DeployMode>().unwrap(), DeployMode::Redeploy);
    }

    #[test]
    fn unknown_mode_is_input_error() {
        let err = "upsert".parse::<DeployMode>().unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::InvalidInput);
        assert!(err.to_string().contains("upsert"));
    }

    #[test]
    fn display_round_trips_through_serde_names() {
        for mode in DeployMode::ALL {
            let json = serde_json::to_value(mode).unwrap();
            assert_eq!(json, serde_json::Value::String(mode.to_string()));
        }
    }

    #[test]
    fn first_match_keeps_server_order() {
        let ids = [Uuid::new_v4(), Uuid::new_v4()];
        assert_eq!(first_match("agent", "a", ids.to_vec(), |id| *id), Some(ids[0]));
        assert_eq!(first_match("agent", "a", Vec::<Uuid>::new(), |id| *id), None);
    }

    #[test]
    fn unresolved_errors_become_absent() {
        let not_found: Result<u8> = Err(MaestroError::Api {
            status: 404,
            detail: serde_json::json!({"detail": "Not found"}),
        });
        assert_eq!(absent_if_unresolved(not_found).unwrap(), None);

        let denied: Result<u8> = Err(MaestroError::Auth {
            status: 401,
            detail: serde_json::json!("bad token"),
        });
        assert!(absent_if_unresolved(denied).is_err());
    }
}
