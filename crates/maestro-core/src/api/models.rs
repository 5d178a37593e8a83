//! Wire models for agent definitions and agents.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// JSON object used for schemas, metadata and environment maps.
pub type JsonMap = Map<String, Value>;

/// Definition type sent for single-file deployments.
pub const PYTHON_DEFINITION_TYPE: &str = "python";

/// Deployable code on the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDefinition {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub definition: Option<String>,
    #[serde(default)]
    pub definition_type: Option<String>,
    #[serde(default)]
    pub input_schema: Option<JsonMap>,
    #[serde(default)]
    pub output_schema: Option<JsonMap>,
    #[serde(default)]
    pub memory_template: Option<JsonMap>,
    #[serde(default)]
    pub environment_variables: Option<JsonMap>,
    #[serde(default)]
    pub is_bundle: Option<bool>,
    #[serde(default)]
    pub entrypoint: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Payload for creating or replacing a definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentDefinitionCreate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<JsonMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<JsonMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_template: Option<JsonMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_variables: Option<JsonMap>,
}

impl AgentDefinitionCreate {
    /// Fill every field left unset from the previously stored definition.
    ///
    /// The wire update is a whole-record replacement, so fields the caller
    /// did not supply must be carried over explicitly.
    pub fn merged_over(mut self, existing: &AgentDefinition) -> Self {
        fn keep<T: Clone>(field: &mut Option<T>, stored: &Option<T>) {
            if field.is_none() {
                field.clone_from(stored);
            }
        }
        keep(&mut self.description, &existing.description);
        keep(&mut self.definition, &existing.definition);
        keep(&mut self.definition_type, &existing.definition_type);
        keep(&mut self.input_schema, &existing.input_schema);
        keep(&mut self.output_schema, &existing.output_schema);
        keep(&mut self.memory_template, &existing.memory_template);
        keep(&mut self.environment_variables, &existing.environment_variables);
        self
    }
}

/// A runnable binding of a definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub agent_type: Option<String>,
    #[serde(default)]
    pub agent_definition_id: Option<Uuid>,
    #[serde(default)]
    pub capabilities: Option<Value>,
    #[serde(default)]
    pub agent_metadata: Option<Value>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Agent {
    /// Whether this agent is (or may be) bound to `definition_id`.
    ///
    /// Agents that do not report a definition reference are accepted.
    pub fn is_bound_to(&self, definition_id: Uuid) -> bool {
        self.agent_definition_id
            .is_none_or(|bound| bound == definition_id)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentCreate {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub agent_type: String,
    pub agent_definition_id: Uuid,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets: Option<JsonMap>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_definition_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets: Option<JsonMap>,
}

/// Metadata sent alongside a new bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct BundleUpload {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Option<JsonMap>,
    pub output_schema: Option<JsonMap>,
    pub interface_id: Option<Uuid>,
    pub entrypoint: String,
    pub version: String,
    pub requirements: Vec<String>,
    pub additional_metadata: Option<JsonMap>,
    pub shareable: bool,
}

impl BundleUpload {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            input_schema: None,
            output_schema: None,
            interface_id: None,
            entrypoint: crate::bundle::DEFAULT_ENTRYPOINT.to_string(),
            version: crate::bundle::DEFAULT_VERSION.to_string(),
            requirements: Vec::new(),
            additional_metadata: None,
            shareable: false,
        }
    }

    /// Scalar multipart fields, in wire order.
    pub fn fields(&self) -> Vec<(String, String)> {
        let mut fields = vec![
            ("name".to_string(), self.name.clone()),
            ("entrypoint".to_string(), self.entrypoint.clone()),
            ("version".to_string(), self.version.clone()),
            ("shareable".to_string(), self.shareable.to_string()),
        ];
        if let Some(description) = self.description.as_ref().filter(|d| !d.is_empty()) {
            fields.push(("description".to_string(), description.clone()));
        }
        push_json(&mut fields, "input_schema", self.input_schema.as_ref());
        push_json(&mut fields, "output_schema", self.output_schema.as_ref());
        if let Some(interface_id) = self.interface_id {
            fields.push(("interface_id".to_string(), interface_id.to_string()));
        }
        push_requirements(&mut fields, &self.requirements);
        push_json(&mut fields, "additional_metadata", self.additional_metadata.as_ref());
        fields
    }
}

/// Metadata sent alongside a replacement bundle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BundleUpdate {
    pub entrypoint: Option<String>,
    pub version: Option<String>,
    pub requirements: Vec<String>,
    pub additional_metadata: Option<JsonMap>,
}

impl BundleUpdate {
    pub fn fields(&self) -> Vec<(String, String)> {
        let mut fields = Vec::new();
        if let Some(entrypoint) = &self.entrypoint {
            fields.push(("entrypoint".to_string(), entrypoint.clone()));
        }
        if let Some(version) = &self.version {
            fields.push(("version".to_string(), version.clone()));
        }
        push_requirements(&mut fields, &self.requirements);
        push_json(&mut fields, "additional_metadata", self.additional_metadata.as_ref());
        fields
    }
}

fn push_json(fields: &mut Vec<(String, String)>, name: &str, value: Option<&JsonMap>) {
    if let Some(map) = value.filter(|m| !m.is_empty()) {
        fields.push((name.to_string(), Value::Object(map.clone()).to_string()));
    }
}

fn push_requirements(fields: &mut Vec<(String, String)>, requirements: &[String]) {
    if !requirements.is_empty() {
        let list = Value::from(requirements.to_vec());
        fields.push(("requirements".to_string(), list.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stored_definition() -> AgentDefinition {
        serde_json::from_value(json!({
            "id": Uuid::nil(),
            "name": "weather",
            "description": "old description",
            "input_schema": {"type": "object"},
            "environment_variables": {"API_KEY": "abc"}
        }))
        .unwrap()
    }

    #[test]
    fn definition_tolerates_sparse_payload() {
        let def: AgentDefinition =
            serde_json::from_value(json!({"id": Uuid::nil(), "name": "x", "extra": 1})).unwrap();
        assert_eq!(def.name, "x");
        assert!(def.description.is_none());
    }

    #[test]
    fn merged_over_keeps_stored_values_for_unset_fields() {
        let update = AgentDefinitionCreate {
            name: "weather".into(),
            definition: Some("print('v2')".into()),
            ..Default::default()
        }
        .merged_over(&stored_definition());

        assert_eq!(update.description.as_deref(), Some("old description"));
        assert_eq!(update.definition.as_deref(), Some("print('v2')"));
        assert_eq!(update.input_schema.unwrap()["type"], json!("object"));
        assert_eq!(update.environment_variables.unwrap()["API_KEY"], json!("abc"));
    }

    #[test]
    fn merged_over_prefers_caller_values() {
        let update = AgentDefinitionCreate {
            name: "weather".into(),
            description: Some("new".into()),
            ..Default::default()
        }
        .merged_over(&stored_definition());
        assert_eq!(update.description.as_deref(), Some("new"));
    }

    #[test]
    fn create_payload_omits_unset_fields() {
        let payload = serde_json::to_value(AgentDefinitionCreate {
            name: "n".into(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(payload, json!({"name": "n"}));
    }

    #[test]
    fn bundle_upload_fields_stringify_structured_values() {
        let mut upload = BundleUpload::new("weather");
        upload.requirements = vec!["requests>=2".into(), "pydantic".into()];
        upload.input_schema = Some(json!({"type": "object"}).as_object().unwrap().clone());
        let fields = upload.fields();

        let get = |k: &str| fields.iter().find(|(n, _)| n == k).map(|(_, v)| v.clone());
        assert_eq!(get("name").as_deref(), Some("weather"));
        assert_eq!(get("entrypoint").as_deref(), Some("main.py"));
        assert_eq!(get("version").as_deref(), Some("1.0.0"));
        assert_eq!(get("shareable").as_deref(), Some("false"));
        assert_eq!(
            get("requirements").as_deref(),
            Some(r#"["requests>=2","pydantic"]"#)
        );
        assert_eq!(get("input_schema").as_deref(), Some(r#"{"type":"object"}"#));
        assert!(get("description").is_none());
        assert!(get("output_schema").is_none());
    }

    #[test]
    fn bundle_update_fields_only_include_supplied_values() {
        assert!(BundleUpdate::default().fields().is_empty());
        let update = BundleUpdate {
            version: Some("2.0.0".into()),
            ..Default::default()
        };
        assert_eq!(
            update.fields(),
            vec![("version".to_string(), "2.0.0".to_string())]
        );
    }

    #[test]
    fn agent_binding_check() {
        let def_id = Uuid::new_v4();
        let mut agent: Agent =
            serde_json::from_value(json!({"id": Uuid::new_v4(), "name": "a"})).unwrap();
        assert!(agent.is_bound_to(def_id));
        agent.agent_definition_id = Some(def_id);
        assert!(agent.is_bound_to(def_id));
        agent.agent_definition_id = Some(Uuid::new_v4());
        assert!(!agent.is_bound_to(def_id));
    }
}
