//! Maestro Core Library
//!
//! Deployment client for the Maestro agent service: request dispatch,
//! agent resources, bundle packaging, deployment mode resolution and the
//! deployment orchestrator, plus the per-directory state they share.

pub mod api;
pub mod bundle;
pub mod config;
pub mod context;
pub mod deploy;
pub mod error;
pub mod http;
pub mod state;
pub mod status;

pub use error::{ErrorKind, MaestroError, Result};

/// Re-exports of commonly used types
pub mod prelude {
    // Configuration
    pub use crate::config::{ClientConfig, ConfigOverrides, ConfigStore, StoredConfig};
    pub use crate::context::AppContext;

    // Errors
    pub use crate::error::{ErrorKind, MaestroError, Result};

    // HTTP
    pub use crate::http::{ApiRequest, ApiResponse, RequestDispatcher, ResponseShape};

    // API
    pub use crate::api::{
        Agent, AgentApi, AgentDefinition, AgentDefinitionCreate, AgentResource, UtilsResource,
    };

    // Bundles
    pub use crate::bundle::{BundleOptions, BundlePackager, BundleReport, DependencyOutcome};

    // Deployment
    pub use crate::deploy::{DeployMode, DeployOptions, DeployReport, DeploymentOrchestrator};
    pub use crate::state::{ProjectState, ProjectStateStore};
    pub use crate::status::{RemoteState, StatusReport};
}
