//! Dependency discovery for Python source trees.
//!
//! `pyproject.toml` wins over `requirements.txt`. Within `pyproject.toml`,
//! PEP 621 `[project].dependencies` and Poetry `[tool.poetry.dependencies]`
//! are both collected, in that order.

use std::fs;
use std::path::Path;

use crate::error::{IoResultExt, Result};

pub const PYPROJECT_FILE: &str = "pyproject.toml";
pub const REQUIREMENTS_FILE: &str = "requirements.txt";

/// Where a dependency listing was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequirementsSource {
    Pyproject,
    RequirementsTxt,
}

/// A discovered dependency listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirements {
    source: RequirementsSource,
    content: String,
}

impl Requirements {
    pub fn source(&self) -> RequirementsSource {
        self.source
    }

    /// The listing as a `requirements.txt` body.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// One requirement per entry, blank lines and comments dropped.
    pub fn lines(&self) -> Vec<String> {
        self.content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(String::from)
            .collect()
    }
}

/// Find the dependency listing for `dir`, if it declares one.
pub fn discover(dir: &Path) -> Result<Option<Requirements>> {
    let pyproject = dir.join(PYPROJECT_FILE);
    if pyproject.is_file() {
        let text = fs::read_to_string(&pyproject).at_path("Failed to read", &pyproject)?;
        match pyproject_dependencies(&text) {
            Ok(deps) if !deps.is_empty() => {
                return Ok(Some(Requirements {
                    source: RequirementsSource::Pyproject,
                    content: deps.join("\n"),
                }));
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(
                    path = %pyproject.display(),
                    error = %e,
                    "Failed to parse pyproject.toml, falling back to requirements.txt"
                );
            }
        }
    }

    let requirements = dir.join(REQUIREMENTS_FILE);
    if requirements.is_file() {
        let text = fs::read_to_string(&requirements).at_path("Failed to read", &requirements)?;
        let content = text.trim();
        if !content.is_empty() {
            return Ok(Some(Requirements {
                source: RequirementsSource::RequirementsTxt,
                content: content.to_string(),
            }));
        }
    }

    Ok(None)
}

fn pyproject_dependencies(text: &str) -> std::result::Result<Vec<String>, toml::de::Error> {
    let doc: toml::Table = toml::from_str(text)?;
    let mut deps = Vec::new();

    if let Some(list) = doc
        .get("project")
        .and_then(|p| p.get("dependencies"))
        .and_then(toml::Value::as_array)
    {
        deps.extend(list.iter().filter_map(toml::Value::as_str).map(String::from));
    }

    if let Some(poetry) = doc
        .get("tool")
        .and_then(|t| t.get("poetry"))
        .and_then(|p| p.get("dependencies"))
        .and_then(toml::Value::as_table)
    {
        for (name, spec) in poetry {
            if name == "python" {
                continue;
            }
            deps.push(poetry_requirement(name, spec));
        }
    }

    Ok(deps)
}

fn poetry_requirement(name: &str, spec: &toml::Value) -> String {
    let version = match spec {
        toml::Value::String(v) => Some(v.as_str()),
        toml::Value::Table(t) => t.get("version").and_then(toml::Value::as_str),
        _ => None,
    };
    match version.map(str::trim) {
        Some(v) if !v.is_empty() && v != "*" => format!("{}{}", name, v),
        _ => name.to_string(),
    }
}
