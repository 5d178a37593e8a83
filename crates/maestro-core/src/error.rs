//! Error taxonomy for the deployment client.
//!
//! Every failure surfaced by the library is a [`MaestroError`]. Callers that
//! need to branch (the mode resolver, the orchestrator, the CLI exit policy)
//! match on [`MaestroError::kind`] rather than on message text.

use std::path::{Path, PathBuf};

use serde_json::Value;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, MaestroError>;

/// Coarse classification of a [`MaestroError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or malformed client configuration; the network was never contacted.
    Config,
    /// The server rejected the credential (401/403).
    Auth,
    /// The server rejected the payload (422).
    Validation,
    /// Any other non-2xx response.
    Api,
    /// Connection, DNS or timeout failure.
    Transport,
    /// The response body did not match the expected shape.
    Decode,
    /// Local filesystem or subprocess failure.
    Io,
    /// Operator supplied an invalid value.
    InvalidInput,
    /// A path template referenced a placeholder that was not supplied.
    PathTemplate,
}

/// Errors produced by the deployment client.
#[derive(Debug, thiserror::Error)]
pub enum MaestroError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Authentication failed ({status}): {detail}")]
    Auth { status: u16, detail: Value },

    #[error("Validation failed ({status}): {detail}")]
    Validation { status: u16, detail: Value },

    #[error("API error {status}: {detail}")]
    Api { status: u16, detail: Value },

    #[error("HTTP request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("Failed to decode response: {message}")]
    Decode { message: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{message}")]
    InvalidInput { message: String },

    #[error("Missing path parameter '{placeholder}' for '{template}'")]
    PathTemplate {
        template: String,
        placeholder: String,
    },
}

impl MaestroError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config { .. } => ErrorKind::Config,
            Self::Auth { .. } => ErrorKind::Auth,
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Api { .. } => ErrorKind::Api,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Decode { .. } => ErrorKind::Decode,
            Self::Io { .. } => ErrorKind::Io,
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::PathTemplate { .. } => ErrorKind::PathTemplate,
        }
    }

    /// HTTP status carried by server-side errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Auth { status, .. } | Self::Validation { status, .. } | Self::Api { status, .. } => {
                Some(*status)
            }
            _ => None,
        }
    }

    /// Structured error body carried by server-side errors.
    pub fn detail(&self) -> Option<&Value> {
        match self {
            Self::Auth { detail, .. } | Self::Validation { detail, .. } | Self::Api { detail, .. } => {
                Some(detail)
            }
            _ => None,
        }
    }

    /// Whether a lookup failure means "the resource does not resolve".
    ///
    /// Only generic API errors qualify; authentication, transport and decode
    /// failures must abort instead of being mistaken for absence.
    pub fn is_unresolved(&self) -> bool {
        self.kind() == ErrorKind::Api
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// I/O error tied to a path, e.g. `Failed to read file: /tmp/x`.
    pub fn io_at(action: &str, path: &Path, source: std::io::Error) -> Self {
        Self::io(format!("{} {}", action, path.display()), source)
    }
}

/// Attach path-aware context to `std::io` results.
pub(crate) trait IoResultExt<T> {
    fn at_path(self, action: &str, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn at_path(self, action: &str, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| MaestroError::io_at(action, &path.into(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(MaestroError::config("x").kind(), ErrorKind::Config);
        assert_eq!(
            MaestroError::Validation {
                status: 422,
                detail: json!({}),
            }
            .kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            MaestroError::invalid_input("bad").kind(),
            ErrorKind::InvalidInput
        );
    }

    #[test]
    fn only_api_errors_count_as_unresolved() {
        let not_found = MaestroError::Api {
            status: 404,
            detail: json!({"detail": "Not found"}),
        };
        let auth = MaestroError::Auth {
            status: 401,
            detail: json!("nope"),
        };
        assert!(not_found.is_unresolved());
        assert!(!auth.is_unresolved());
        assert!(!MaestroError::decode("garbled").is_unresolved());
    }

    #[test]
    fn status_and_detail_exposed_for_server_errors() {
        let err = MaestroError::Api {
            status: 500,
            detail: json!("boom"),
        };
        assert_eq!(err.status(), Some(500));
        assert_eq!(err.detail(), Some(&json!("boom")));
        assert_eq!(MaestroError::config("x").status(), None);
    }

    #[test]
    fn io_at_includes_path() {
        let err = MaestroError::io_at(
            "Failed to read file:",
            Path::new("/tmp/missing"),
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        assert!(err.to_string().contains("/tmp/missing"));
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
