//! Deployment: mode resolution, schema loading and orchestration.

pub mod orchestrator;
pub mod resolver;
pub mod schemas;

pub use orchestrator::{
    DEFAULT_AGENT_TYPE, DeployOptions, DeployReport, DeploySource, DeploymentOrchestrator,
};
pub use resolver::{DeployMode, DeployModeResolver, Resolution, ResolutionBasis};
pub use schemas::{LoadedSchemas, Schemas, load_schemas};

use crate::error::{MaestroError, Result};

/// Split a `KEY=VALUE` assignment. The value may contain `=`.
pub fn parse_env_assignment(raw: &str) -> Result<(String, String)> {
    let (key, value) = raw.split_once('=').ok_or_else(|| {
        MaestroError::invalid_input(format!("Expected KEY=VALUE, got '{}'", raw))
    })?;
    let key = key.trim();
    if key.is_empty() {
        return Err(MaestroError::invalid_input(format!(
            "Missing variable name in '{}'",
            raw
        )));
    }
    Ok((key.to_string(), value.to_string()))
}
