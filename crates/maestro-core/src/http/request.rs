//! Request envelope: one logical call described before it hits the wire.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::error::{MaestroError, Result};

use super::response::ResponseShape;

/// A query parameter value with its canonical wire rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryValue {
    Str(String),
    Bool(bool),
    Int(i64),
    Id(Uuid),
}

impl QueryValue {
    pub fn render(&self) -> String {
        match self {
            Self::Str(s) => s.clone(),
            Self::Bool(b) => if *b { "true" } else { "false" }.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Id(id) => id.to_string(),
        }
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<bool> for QueryValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for QueryValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for QueryValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<Uuid> for QueryValue {
    fn from(value: Uuid) -> Self {
        Self::Id(value)
    }
}

/// Where a file part's bytes come from.
#[derive(Debug, Clone)]
pub enum FileSource {
    /// Streamed from disk; the handle is opened for the duration of one request.
    Path(PathBuf),
    Bytes(Vec<u8>),
}

/// One file in a multipart body.
#[derive(Debug, Clone)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub mime: String,
    pub source: FileSource,
}

impl FilePart {
    pub fn from_path(
        field: impl Into<String>,
        path: impl Into<PathBuf>,
        mime: impl Into<String>,
    ) -> Self {
        let path = path.into();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        Self {
            field: field.into(),
            file_name,
            mime: mime.into(),
            source: FileSource::Path(path),
        }
    }

    pub fn from_bytes(
        field: impl Into<String>,
        file_name: impl Into<String>,
        mime: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            field: field.into(),
            file_name: file_name.into(),
            mime: mime.into(),
            source: FileSource::Bytes(bytes),
        }
    }
}

/// The encoded body of a request. Exactly one encoding is ever chosen.
#[derive(Debug, Clone)]
pub enum RequestBody {
    Empty,
    Json(Value),
    Form(Vec<(String, String)>),
    /// File parts plus scalar fields carried as additional parts.
    Multipart {
        files: Vec<FilePart>,
        fields: Vec<(String, String)>,
    },
}

/// Description of a single API call.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    path_params: BTreeMap<String, String>,
    query: Vec<(String, Option<QueryValue>)>,
    json: Option<Value>,
    form: Vec<(String, String)>,
    files: Vec<FilePart>,
    expected_status: u16,
    organization_scoped: bool,
    timeout: Option<Duration>,
    shape: ResponseShape,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            path_params: BTreeMap::new(),
            query: Vec::new(),
            json: None,
            form: Vec::new(),
            files: Vec::new(),
            expected_status: 200,
            organization_scoped: true,
            timeout: None,
            shape: ResponseShape::Value,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn path_param(mut self, name: impl Into<String>, value: impl fmt::Display) -> Self {
        self.path_params.insert(name.into(), value.to_string());
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<QueryValue>) -> Self {
        self.query.push((name.into(), Some(value.into())));
        self
    }

    /// Add a query parameter that is omitted entirely when `None`.
    pub fn query_opt<V: Into<QueryValue>>(mut self, name: impl Into<String>, value: Option<V>) -> Self {
        self.query.push((name.into(), value.map(Into::into)));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.json = Some(body);
        self
    }

    /// Serialize `body` into the JSON payload.
    pub fn json_body<T: Serialize>(self, body: &T) -> Result<Self> {
        let value = serde_json::to_value(body).map_err(|e| {
            MaestroError::invalid_input(format!("Failed to serialize request body: {}", e))
        })?;
        Ok(self.json(value))
    }

    pub fn form_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.form.push((name.into(), value.into()));
        self
    }

    pub fn file(mut self, part: FilePart) -> Self {
        self.files.push(part);
        self
    }

    pub fn expect_status(mut self, status: u16) -> Self {
        self.expected_status = status;
        self
    }

    /// Do not attach the organization id to this call.
    pub fn unscoped(mut self) -> Self {
        self.organization_scoped = false;
        self
    }

    /// Override the default timeout for this call only.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn shape(mut self, shape: ResponseShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path_template(&self) -> &str {
        &self.path
    }

    pub fn expected_status(&self) -> u16 {
        self.expected_status
    }

    pub fn is_organization_scoped(&self) -> bool {
        self.organization_scoped
    }

    pub fn call_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn response_shape(&self) -> ResponseShape {
        self.shape
    }

    /// Substitute `{name}` placeholders from the path parameters.
    pub fn render_path(&self) -> Result<String> {
        let template = &self.path;
        let mut out = String::with_capacity(template.len());
        let mut rest = template.as_str();

        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let end = after.find('}').ok_or_else(|| MaestroError::PathTemplate {
                template: template.clone(),
                placeholder: after.to_string(),
            })?;
            let name = &after[..end];
            let value = self
                .path_params
                .get(name)
                .ok_or_else(|| MaestroError::PathTemplate {
                    template: template.clone(),
                    placeholder: name.to_string(),
                })?;
            out.push_str(value);
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }

    /// Cleaned query pairs, with the organization id appended when scoped.
    pub fn query_pairs(&self, organization_id: Option<Uuid>) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> = self
            .query
            .iter()
            .filter_map(|(name, value)| value.as_ref().map(|v| (name.clone(), v.render())))
            .collect();

        if let Some(org) = organization_id.filter(|_| self.organization_scoped) {
            if !pairs.iter().any(|(name, _)| name == "organization_id") {
                pairs.push(("organization_id".to_string(), org.to_string()));
            }
        }
        pairs
    }

    /// Pick the body encoding: files, then form fields, then JSON.
    pub fn body(&self) -> RequestBody {
        if !self.files.is_empty() {
            RequestBody::Multipart {
                files: self.files.clone(),
                fields: self.form.clone(),
            }
        } else if !self.form.is_empty() {
            RequestBody::Form(self.form.clone())
        } else if let Some(json) = &self.json {
            RequestBody::Json(json.clone())
        } else {
            RequestBody::Empty
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use serde_json::json;

    #[test]
    fn render_path_substitutes_placeholders() {
        let id = Uuid::nil();
        let req = ApiRequest::get("/api/v1/agents/{agent_id}/bundle").path_param("agent_id", id);
        assert_eq!(
            req.render_path().unwrap(),
            format!("/api/v1/agents/{}/bundle", id)
        );
    }

    #[test]
    fn render_path_missing_placeholder_fails_fast() {
        let req = ApiRequest::get("/api/v1/agents/{agent_id}");
        let err = req.render_path().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PathTemplate);
        assert!(err.to_string().contains("agent_id"));
    }

    #[test]
    fn absent_query_values_are_dropped_and_falsy_kept() {
        let req = ApiRequest::get("/x")
            .query_opt::<String>("name", None)
            .query("shareable", false)
            .query("skip", 0i64)
            .query("label", "");
        let pairs = req.query_pairs(None);
        assert_eq!(
            pairs,
            vec![
                ("shareable".to_string(), "false".to_string()),
                ("skip".to_string(), "0".to_string()),
                ("label".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn organization_id_added_unless_suppressed() {
        let org = Uuid::new_v4();
        let scoped = ApiRequest::get("/x").query_pairs(Some(org));
        assert_eq!(scoped, vec![("organization_id".to_string(), org.to_string())]);

        let unscoped = ApiRequest::get("/x").unscoped().query_pairs(Some(org));
        assert!(unscoped.is_empty());
    }

    #[test]
    fn explicit_organization_id_not_duplicated() {
        let org = Uuid::new_v4();
        let other = Uuid::new_v4();
        let pairs = ApiRequest::get("/x")
            .query("organization_id", other)
            .query_pairs(Some(org));
        assert_eq!(pairs, vec![("organization_id".to_string(), other.to_string())]);
    }

    #[test]
    fn files_win_and_carry_fields_as_parts() {
        let req = ApiRequest::post("/upload")
            .json(json!({"ignored": true}))
            .form_field("name", "agent")
            .file(FilePart::from_bytes("bundle", "b.zip", "application/zip", vec![1, 2]));

        match req.body() {
            RequestBody::Multipart { files, fields } => {
                assert_eq!(files.len(), 1);
                assert_eq!(fields, vec![("name".to_string(), "agent".to_string())]);
            }
            other => panic!("expected multipart, got {:?}", other),
        }
    }

    #[test]
    fn form_beats_json_and_json_is_last_resort() {
        let form = ApiRequest::post("/x")
            .json(json!({"a": 1}))
            .form_field("k", "v");
        assert!(matches!(form.body(), RequestBody::Form(_)));

        let json_only = ApiRequest::post("/x").json(json!({"a": 1}));
        assert!(matches!(json_only.body(), RequestBody::Json(_)));

        assert!(matches!(ApiRequest::get("/x").body(), RequestBody::Empty));
    }

    #[test]
    fn json_body_renders_ids_as_strings() {
        #[derive(Serialize)]
        struct Payload {
            id: Uuid,
            nested: Vec<Uuid>,
        }
        let id = Uuid::new_v4();
        let req = ApiRequest::post("/x")
            .json_body(&Payload {
                id,
                nested: vec![id],
            })
            .unwrap();
        match req.body() {
            RequestBody::Json(value) => {
                assert_eq!(value["id"], json!(id.to_string()));
                assert_eq!(value["nested"][0], json!(id.to_string()));
            }
            other => panic!("expected json, got {:?}", other),
        }
    }

    #[test]
    fn file_part_name_from_path() {
        let part = FilePart::from_path("bundle", "/tmp/out/agent_bundle.zip", "application/zip");
        assert_eq!(part.file_name, "agent_bundle.zip");
    }
}
