//! Application context for unified dependency injection.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::api::{AgentApi, AgentResource, UtilsResource};
use crate::bundle::BundlePackager;
use crate::config::ClientConfig;
use crate::deploy::DeploymentOrchestrator;
use crate::http::RequestDispatcher;
use crate::state::ProjectStateStore;

/// Per-invocation context.
///
/// Owns the one [`RequestDispatcher`] for this invocation and hands out the
/// services built on it. Frontends create this once and pass it to commands.
#[derive(Debug, Clone)]
pub struct AppContext {
    config: ClientConfig,
    project_dir: PathBuf,
    dispatcher: Arc<RequestDispatcher>,
}

impl AppContext {
    pub fn new(config: ClientConfig, project_dir: PathBuf) -> Self {
        let dispatcher = Arc::new(RequestDispatcher::from_config(&config));
        Self {
            config,
            project_dir,
            dispatcher,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    pub fn dispatcher(&self) -> &Arc<RequestDispatcher> {
        &self.dispatcher
    }

    /// Get an AgentResource.
    pub fn agents(&self) -> AgentResource {
        AgentResource::new(Arc::clone(&self.dispatcher))
            .with_upload_timeout(self.config.upload_timeout)
    }

    pub fn utils(&self) -> UtilsResource {
        UtilsResource::new(Arc::clone(&self.dispatcher))
    }

    /// Get a ProjectStateStore for the given directory.
    pub fn state_store(&self, dir: &Path) -> ProjectStateStore {
        ProjectStateStore::new(dir)
    }

    /// Get a ProjectStateStore for the context's project directory.
    pub fn project_state_store(&self) -> ProjectStateStore {
        self.state_store(&self.project_dir)
    }

    pub fn packager(&self) -> BundlePackager {
        BundlePackager::default()
    }

    /// Get a DeploymentOrchestrator.
    pub fn orchestrator(&self) -> DeploymentOrchestrator {
        let api: Arc<dyn AgentApi> = Arc::new(self.agents());
        DeploymentOrchestrator::new(api, self.packager())
    }

    /// Release the HTTP client. Later calls rebuild it.
    pub fn close(&self) {
        self.dispatcher.close();
    }
}
