//! Response shapes, status mapping and typed decoding.

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{MaestroError, Result};

/// Keys under which list endpoints may wrap their array payload.
const LIST_WRAPPER_KEYS: &[&str] = &["items", "data", "results"];

/// Longest body excerpt quoted in decode errors.
const EXCERPT_LEN: usize = 500;

/// What the caller expects back from a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    /// Discard the body.
    None,
    Bytes,
    Text,
    /// Parsed JSON, returned as-is.
    Value,
    /// A single JSON value that must not be an array.
    Single,
    /// A JSON array, or an object wrapping one.
    List,
}

/// Body of a successful call, already checked against its [`ResponseShape`].
#[derive(Debug, Clone, PartialEq)]
pub enum ApiResponse {
    Empty,
    Bytes(Vec<u8>),
    Text(String),
    Value(Value),
    Single(Value),
    List(Vec<Value>),
}

impl ApiResponse {
    pub fn into_value(self) -> Result<Value> {
        match self {
            Self::Value(v) | Self::Single(v) => Ok(v),
            Self::List(items) => Ok(Value::Array(items)),
            Self::Empty => Ok(Value::Null),
            other => Err(MaestroError::decode(format!(
                "Expected a JSON response, got {}",
                other.describe()
            ))),
        }
    }

    pub fn into_bytes(self) -> Result<Vec<u8>> {
        match self {
            Self::Bytes(b) => Ok(b),
            Self::Text(t) => Ok(t.into_bytes()),
            Self::Empty => Ok(Vec::new()),
            other => Err(MaestroError::decode(format!(
                "Expected a binary response, got {}",
                other.describe()
            ))),
        }
    }

    pub fn into_text(self) -> Result<String> {
        match self {
            Self::Text(t) => Ok(t),
            Self::Empty => Ok(String::new()),
            other => Err(MaestroError::decode(format!(
                "Expected a text response, got {}",
                other.describe()
            ))),
        }
    }

    /// Validate a single-shaped response into `T`.
    pub fn into_single<T: DeserializeOwned>(self) -> Result<T> {
        match self {
            Self::Single(value) => validate(value),
            Self::Empty => Err(MaestroError::decode("Expected a JSON object, got no content")),
            other => Err(MaestroError::decode(format!(
                "Expected a single JSON value, got {}",
                other.describe()
            ))),
        }
    }

    /// Validate every element of a list-shaped response into `T`.
    pub fn into_list<T: DeserializeOwned>(self) -> Result<Vec<T>> {
        match self {
            Self::List(items) => items.into_iter().map(validate).collect(),
            Self::Empty => Err(MaestroError::decode("Expected a JSON array, got no content")),
            other => Err(MaestroError::decode(format!(
                "Expected a JSON array, got {}",
                other.describe()
            ))),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Self::Empty => "no content",
            Self::Bytes(_) => "bytes",
            Self::Text(_) => "text",
            Self::Value(_) => "untyped JSON",
            Self::Single(_) => "a single JSON value",
            Self::List(_) => "a JSON array",
        }
    }
}

fn validate<T: DeserializeOwned>(value: Value) -> Result<T> {
    let excerpt = excerpt(&value.to_string());
    serde_json::from_value(value).map_err(|e| {
        MaestroError::decode(format!(
            "Failed to parse response into {}: {}\nResponse JSON: {}",
            std::any::type_name::<T>(),
            e,
            excerpt
        ))
    })
}

/// Map a non-2xx status and its body onto the error taxonomy.
///
/// Returns `Ok(())` for 2xx statuses.
pub fn check_status(status: u16, body: &[u8]) -> Result<()> {
    if (200..300).contains(&status) {
        return Ok(());
    }

    let detail = error_detail(status, body);
    Err(match status {
        401 | 403 => MaestroError::Auth { status, detail },
        422 => MaestroError::Validation { status, detail },
        _ => MaestroError::Api { status, detail },
    })
}

/// Best-effort decode of an error body: JSON, then text, then a placeholder.
fn error_detail(status: u16, body: &[u8]) -> Value {
    if let Ok(json) = serde_json::from_slice::<Value>(body) {
        return json;
    }
    let text = String::from_utf8_lossy(body);
    if text.trim().is_empty() {
        Value::String(format!("Status Code {}, No Body", status))
    } else {
        Value::String(text.into_owned())
    }
}

/// Decode a successful body according to `shape`.
pub fn decode_body(shape: ResponseShape, status: u16, body: Vec<u8>) -> Result<ApiResponse> {
    match shape {
        ResponseShape::None => Ok(ApiResponse::Empty),
        ResponseShape::Bytes => Ok(ApiResponse::Bytes(body)),
        ResponseShape::Text => Ok(ApiResponse::Text(
            String::from_utf8_lossy(&body).into_owned(),
        )),
        ResponseShape::Value => parse_json(status, &body).map(ApiResponse::Value),
        ResponseShape::Single => match parse_json(status, &body)? {
            Value::Array(_) => Err(MaestroError::decode(format!(
                "Response JSON type (array) does not match expected single value. JSON: {}",
                excerpt(&String::from_utf8_lossy(&body))
            ))),
            value => Ok(ApiResponse::Single(value)),
        },
        ResponseShape::List => match parse_json(status, &body)? {
            Value::Array(items) => Ok(ApiResponse::List(items)),
            Value::Object(mut map) => {
                for key in LIST_WRAPPER_KEYS {
                    if let Some(Value::Array(items)) = map.remove(*key) {
                        return Ok(ApiResponse::List(items));
                    }
                }
                Err(MaestroError::decode(format!(
                    "Response JSON object does not wrap a list. JSON: {}",
                    excerpt(&String::from_utf8_lossy(&body))
                )))
            }
            other => Err(MaestroError::decode(format!(
                "Response JSON type does not match expected list. JSON: {}",
                excerpt(&other.to_string())
            ))),
        },
    }
}

fn parse_json(status: u16, body: &[u8]) -> Result<Value> {
    serde_json::from_slice(body).map_err(|e| {
        MaestroError::decode(format!(
            "Failed to decode JSON response (Status: {}): {}\nResponse Text: {}",
            status,
            e,
            excerpt(&String::from_utf8_lossy(body))
        ))
    })
}

fn excerpt(text: &str) -> String {
    if text.chars().count() <= EXCERPT_LEN {
        return text.to_string();
    }
    let cut: String = text.chars().take(EXCERPT_LEN).collect();
    format!("{}...", cut)
}
