//! Config store for loading and saving config.toml.

use std::path::{Path, PathBuf};

use crate::error::{IoResultExt, MaestroError, Result};

use super::StoredConfig;

const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone)]
pub struct ConfigStore {
    config_path: PathBuf,
}

impl ConfigStore {
    /// Store rooted at the platform config directory (`~/.config/maestro`).
    pub fn from_default_dir() -> Result<Self> {
        let dir = dirs::config_dir()
            .ok_or_else(|| MaestroError::config("Could not determine config directory"))?
            .join("maestro");
        Ok(Self::from_dir(dir))
    }

    pub fn from_dir(dir: PathBuf) -> Self {
        Self {
            config_path: dir.join(CONFIG_FILE),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Load the stored config; a missing file yields an empty config.
    pub fn load(&self) -> Result<StoredConfig> {
        if !self.config_path.exists() {
            return Ok(StoredConfig::default());
        }
        let content = std::fs::read_to_string(&self.config_path)
            .at_path("Failed to read config file:", &self.config_path)?;
        toml::from_str(&content).map_err(|e| {
            MaestroError::config(format!(
                "Failed to parse config file {}: {}",
                self.config_path.display(),
                e
            ))
        })
    }

    pub fn save(&self, config: &StoredConfig) -> Result<()> {
        let content = toml::to_string_pretty(config).map_err(|e| {
            MaestroError::config(format!("Failed to serialize config to TOML: {}", e))
        })?;
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)
                .at_path("Failed to create config directory:", parent)?;
        }
        std::fs::write(&self.config_path, content)
            .at_path("Failed to write config file:", &self.config_path)?;
        Ok(())
    }
}
