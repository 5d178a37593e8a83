//! Client configuration.
//!
//! Values come from three layers, highest precedence first: explicit
//! overrides (command-line flags), the persisted `config.toml`, and
//! environment variables. Resolution validates everything the dispatcher
//! needs so that a misconfigured invocation fails before touching the network.

mod store;

pub use store::ConfigStore;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;
use uuid::Uuid;

use crate::error::{MaestroError, Result};

/// Base URL used when no layer provides one.
pub const DEFAULT_BASE_URL: &str = "https://dantalabs.com";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Timeout applied to bundle uploads.
pub const DEFAULT_UPLOAD_TIMEOUT: Duration = Duration::from_secs(600);

pub const ENV_BASE_URL: &str = "MAESTRO_API_URL";
pub const ENV_TOKEN: &str = "MAESTRO_AUTH_TOKEN";
pub const ENV_ORGANIZATION_ID: &str = "MAESTRO_ORGANIZATION_ID";

/// Contents of `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
}

/// Values supplied explicitly by the operator.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub organization_id: Option<String>,
}

/// Fully resolved and validated client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: Url,
    pub token: String,
    pub organization_id: Uuid,
    pub timeout: Duration,
    pub upload_timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: Url, token: impl Into<String>, organization_id: Uuid) -> Self {
        Self {
            base_url,
            token: token.into(),
            organization_id,
            timeout: DEFAULT_TIMEOUT,
            upload_timeout: DEFAULT_UPLOAD_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_upload_timeout(mut self, timeout: Duration) -> Self {
        self.upload_timeout = timeout;
        self
    }

    /// Resolve configuration using the process environment.
    pub fn resolve(overrides: &ConfigOverrides, stored: &StoredConfig) -> Result<Self> {
        Self::resolve_with_env(overrides, stored, |key| std::env::var(key).ok())
    }

    /// Resolve configuration with an explicit environment lookup.
    pub fn resolve_with_env<F>(
        overrides: &ConfigOverrides,
        stored: &StoredConfig,
        env: F,
    ) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |flag: &Option<String>, file: &Option<String>, key: &str| {
            non_empty(flag.clone())
                .or_else(|| non_empty(file.clone()))
                .or_else(|| non_empty(env(key)))
        };

        let base_url = pick(&overrides.base_url, &stored.base_url, ENV_BASE_URL)
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        let token = pick(&overrides.token, &stored.token, ENV_TOKEN).ok_or_else(|| {
            MaestroError::config(format!(
                "Auth token not found. Run 'maestro setup', set {}, or use --token",
                ENV_TOKEN
            ))
        })?;
        let organization_id = pick(
            &overrides.organization_id,
            &stored.organization_id,
            ENV_ORGANIZATION_ID,
        )
        .ok_or_else(|| {
            MaestroError::config(format!(
                "Organization ID not found. Run 'maestro setup', set {}, or use --org-id",
                ENV_ORGANIZATION_ID
            ))
        })?;

        Ok(Self::new(
            parse_base_url(&base_url)?,
            token,
            parse_organization_id(&organization_id)?,
        ))
    }

    /// The subset of this configuration worth persisting.
    pub fn to_stored(&self) -> StoredConfig {
        StoredConfig {
            base_url: Some(self.base_url.as_str().trim_end_matches('/').to_string()),
            token: Some(self.token.clone()),
            organization_id: Some(self.organization_id.to_string()),
        }
    }
}

pub fn parse_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim())
        .map_err(|e| MaestroError::config(format!("Invalid API base URL '{}': {}", raw, e)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(MaestroError::config(format!(
            "API base URL must use http or https: {}",
            raw
        )));
    }
    Ok(url)
}

pub fn parse_organization_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| {
        MaestroError::config(format!("Organization ID must be a valid UUID: {}", raw))
    })
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
