//! Request dispatch to the Maestro API.
//!
//! [`RequestDispatcher`] is the only component that talks to the network.
//! It injects the bearer credential, renders the path and query, encodes
//! exactly one body type, maps status codes onto [`MaestroError`] and decodes
//! the payload into the caller's declared [`ResponseShape`].

mod request;
mod response;

pub use request::{ApiRequest, FilePart, FileSource, QueryValue, RequestBody};
pub use response::{ApiResponse, ResponseShape, check_status, decode_body};

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;
use uuid::Uuid;

use crate::config::{ClientConfig, DEFAULT_TIMEOUT};
use crate::error::{IoResultExt, MaestroError, Result};

const USER_AGENT: &str = concat!("maestro/", env!("CARGO_PKG_VERSION"));

/// Sends [`ApiRequest`]s over a lazily constructed, reusable HTTP client.
#[derive(Debug)]
pub struct RequestDispatcher {
    base_url: String,
    token: Option<String>,
    organization_id: Option<Uuid>,
    timeout: Duration,
    system_proxy: bool,
    client: Mutex<Option<reqwest::Client>>,
}

impl RequestDispatcher {
    pub fn new(base_url: &Url, token: Option<String>, organization_id: Option<Uuid>) -> Self {
        Self {
            base_url: base_url.as_str().trim_end_matches('/').to_string(),
            token,
            organization_id,
            timeout: DEFAULT_TIMEOUT,
            system_proxy: true,
            client: Mutex::new(None),
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            &config.base_url,
            Some(config.token.clone()),
            Some(config.organization_id),
        )
        .with_timeout(config.timeout)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Ignore `HTTP_PROXY`/`HTTPS_PROXY` and connect directly.
    pub fn without_proxy(mut self) -> Self {
        self.system_proxy = false;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn organization_id(&self) -> Option<Uuid> {
        self.organization_id
    }

    /// Whether a connection client is currently held.
    pub fn is_open(&self) -> bool {
        self.client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Drop the connection client. The next call builds a fresh one.
    pub fn close(&self) {
        let dropped = self
            .client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if dropped.is_some() {
            tracing::debug!("Closed HTTP client");
        }
    }

    fn client(&self) -> Result<reqwest::Client> {
        let mut guard = self.client.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }

        let builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT);
        let builder = if self.system_proxy {
            builder
        } else {
            builder.no_proxy()
        };
        let client = builder
            .build()
            .map_err(|e| MaestroError::config(format!("Failed to build HTTP client: {}", e)))?;
        *guard = Some(client.clone());
        Ok(client)
    }

    fn bearer(&self) -> Result<String> {
        match self.token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => Ok(format!("Bearer {}", token)),
            _ => Err(MaestroError::config("Authentication token is not set")),
        }
    }

    /// Perform one round trip and decode the body per the request's shape.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let authorization = self.bearer()?;
        let path = request.render_path()?;
        let mut url = Url::parse(&format!("{}{}", self.base_url, path)).map_err(|e| {
            MaestroError::invalid_input(format!("Invalid request URL for '{}': {}", path, e))
        })?;
        let pairs = request.query_pairs(self.organization_id);
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs.iter());
        }

        let client = self.client()?;
        let mut builder = client
            .request(request.method().clone(), url)
            .header(AUTHORIZATION, authorization)
            .header(ACCEPT, "application/json");
        if let Some(timeout) = request.call_timeout() {
            builder = builder.timeout(timeout);
        }

        builder = match request.body() {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(&value),
            RequestBody::Form(fields) => builder.form(&fields),
            RequestBody::Multipart { files, fields } => {
                builder.multipart(multipart_form(files, fields).await?)
            }
        };

        tracing::debug!(method = %request.method(), path = %path, "Sending request");
        let response = builder.send().await.map_err(MaestroError::Transport)?;
        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(MaestroError::Transport)?;

        check_status(status, &body)?;

        let expected = request.expected_status();
        if status == 204 {
            if expected != 204 {
                tracing::warn!(
                    path = %path,
                    expected,
                    "Received 204 No Content, but expected status {}",
                    expected
                );
            }
            return Ok(match request.response_shape() {
                ResponseShape::Value => ApiResponse::Value(Value::Null),
                ResponseShape::Bytes => ApiResponse::Bytes(Vec::new()),
                ResponseShape::Text => ApiResponse::Text(String::new()),
                _ => ApiResponse::Empty,
            });
        }
        if status != expected {
            tracing::debug!(path = %path, status, expected, "Unexpected success status");
        }

        decode_body(request.response_shape(), status, body.to_vec())
    }

    /// Call and discard the body.
    pub async fn execute(&self, request: ApiRequest) -> Result<()> {
        self.send(request.shape(ResponseShape::None)).await?;
        Ok(())
    }

    pub async fn fetch_value(&self, request: ApiRequest) -> Result<Value> {
        self.send(request.shape(ResponseShape::Value))
            .await?
            .into_value()
    }

    pub async fn fetch_bytes(&self, request: ApiRequest) -> Result<Vec<u8>> {
        self.send(request.shape(ResponseShape::Bytes))
            .await?
            .into_bytes()
    }

    pub async fn fetch_text(&self, request: ApiRequest) -> Result<String> {
        self.send(request.shape(ResponseShape::Text))
            .await?
            .into_text()
    }

    pub async fn fetch_one<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T> {
        self.send(request.shape(ResponseShape::Single))
            .await?
            .into_single()
    }

    pub async fn fetch_list<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<Vec<T>> {
        self.send(request.shape(ResponseShape::List))
            .await?
            .into_list()
    }
}

/// Build a multipart form. File handles opened here live only as long as the
/// request body that owns them.
async fn multipart_form(files: Vec<FilePart>, fields: Vec<(String, String)>) -> Result<Form> {
    let mut form = Form::new();

    for part in files {
        let body = match part.source {
            FileSource::Path(path) => {
                let file = tokio::fs::File::open(&path)
                    .await
                    .at_path("Failed to open upload file:", &path)?;
                let len = file
                    .metadata()
                    .await
                    .at_path("Failed to stat upload file:", &path)?
                    .len();
                Part::stream_with_length(file, len)
            }
            FileSource::Bytes(bytes) => Part::bytes(bytes),
        };
        let body = body
            .file_name(part.file_name)
            .mime_str(&part.mime)
            .map_err(|e| MaestroError::invalid_input(format!("Invalid MIME type: {}", e)))?;
        form = form.part(part.field, body);
    }

    for (name, value) in fields {
        form = form.text(name, value);
    }

    Ok(form)
}
