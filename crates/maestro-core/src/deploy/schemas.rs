//! Input/output/memory schema files.
//!
//! A schema file is a JSON object with optional `input`, `output` and
//! `memory` keys. Without an explicit path the conventional location is
//! `<script>.json` next to a script, or `<dir>/<dirname>.json` inside a
//! bundle directory.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::api::JsonMap;

/// Schemas attached to a definition. Empty schemas are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schemas {
    pub input: Option<JsonMap>,
    pub output: Option<JsonMap>,
    pub memory: Option<JsonMap>,
}

/// Schema file and any problems reading it.
#[derive(Debug, Clone, Default)]
pub struct LoadedSchemas {
    pub schemas: Schemas,
    pub path: Option<PathBuf>,
    pub warnings: Vec<String>,
}

/// Conventional schema file for a script or bundle directory.
pub fn default_schema_path(source: &Path) -> Option<PathBuf> {
    if source.is_dir() {
        let name = source.file_name()?;
        let mut file = name.to_os_string();
        file.push(".json");
        Some(source.join(file))
    } else {
        Some(source.with_extension("json"))
    }
}

/// Load schemas for `source`.
///
/// Never fails: unreadable or malformed files are reported as warnings and
/// leave the schemas empty.
pub fn load_schemas(source: &Path, explicit: Option<&Path>) -> LoadedSchemas {
    let mut loaded = LoadedSchemas::default();
    let path = match explicit {
        Some(path) => {
            if !path.is_file() {
                loaded.warn(format!(
                    "Schema file '{}' not found, continuing with empty schemas",
                    path.display()
                ));
                return loaded;
            }
            path.to_path_buf()
        }
        None => match default_schema_path(source).filter(|p| p.is_file()) {
            Some(path) => path,
            None => return loaded,
        },
    };

    let parsed = std::fs::read_to_string(&path)
        .map_err(|e| format!("Error reading schema file '{}': {}", path.display(), e))
        .and_then(|text| {
            serde_json::from_str::<Value>(&text)
                .map_err(|e| format!("Error parsing JSON file '{}': {}", path.display(), e))
        });
    let doc = match parsed {
        Ok(Value::Object(doc)) => doc,
        Ok(_) => {
            loaded.warn(format!(
                "Schema file '{}' is not a JSON object, continuing with empty schemas",
                path.display()
            ));
            return loaded;
        }
        Err(message) => {
            loaded.warn(format!("{}. Continuing with empty schemas", message));
            return loaded;
        }
    };

    tracing::info!(path = %path.display(), "Loading schemas");
    loaded.schemas.input = loaded.section(&doc, "input");
    loaded.schemas.output = loaded.section(&doc, "output");
    loaded.schemas.memory = loaded.section(&doc, "memory");
    loaded.path = Some(path);
    loaded
}

impl LoadedSchemas {
    fn warn(&mut self, message: String) {
        tracing::warn!("{}", message);
        self.warnings.push(message);
    }

    fn section(&mut self, doc: &JsonMap, key: &str) -> Option<JsonMap> {
        match doc.get(key)? {
            Value::Object(map) if map.is_empty() => None,
            Value::Object(map) => Some(map.clone()),
            Value::Null => None,
            _ => {
                self.warn(format!("Schema key '{}' is not a JSON object, ignoring it", key));
                None
            }
        }
    }
}
