//! `maestro.yaml` bundle manifest.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MaestroError, Result};

use super::{DEFAULT_DESCRIPTION, DEFAULT_ENTRYPOINT, DEFAULT_VERSION};

/// Manifest file names recognised at the root of a source tree, in lookup order.
pub const MANIFEST_FILES: &[&str] = &["maestro.yaml", "maestro.yml"];

/// Entrypoint, version and description of a bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleManifest {
    #[serde(default = "default_entrypoint")]
    pub entrypoint: String,
    #[serde(default = "default_description")]
    pub description: String,
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_entrypoint() -> String {
    DEFAULT_ENTRYPOINT.to_string()
}

fn default_description() -> String {
    DEFAULT_DESCRIPTION.to_string()
}

fn default_version() -> String {
    DEFAULT_VERSION.to_string()
}

impl Default for BundleManifest {
    fn default() -> Self {
        Self {
            entrypoint: default_entrypoint(),
            description: default_description(),
            version: default_version(),
        }
    }
}

impl BundleManifest {
    pub fn with_entrypoint(mut self, entrypoint: impl Into<String>) -> Self {
        self.entrypoint = entrypoint.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| {
            MaestroError::invalid_input(format!("Failed to serialize bundle manifest: {}", e))
        })
    }

    /// Read the manifest shipped with a source tree, if any.
    ///
    /// Unparsable manifests are still shipped verbatim; here they are logged
    /// and treated as absent.
    pub fn load_from_dir(dir: &Path) -> Option<Self> {
        let path = MANIFEST_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|p| p.is_file())?;
        let parsed = std::fs::read_to_string(&path)
            .map_err(|e| e.to_string())
            .and_then(|text| serde_yaml::from_str::<Self>(&text).map_err(|e| e.to_string()));
        match parsed {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable manifest");
                None
            }
        }
    }
}

/// Whether `name` is a manifest file at the archive root.
pub fn is_manifest(name: &str) -> bool {
    MANIFEST_FILES.contains(&name)
}
