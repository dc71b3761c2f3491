//! Error types shared by the server and the client.
//!
//! # Design
//! `ValidationError` aggregates one `FieldError` per invalid field and is
//! always a value, never a panic. `ApiClientError` is the single failure type
//! the client surfaces: the HTTP status travels with it so callers can tell
//! "could not reach server" (`status_code == 0`) from "server rejected the
//! request" (4xx) or "server failed" (5xx). `ErrorBody` is the JSON envelope
//! every non-2xx response carries.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http::HttpResponse;

/// One invalid field, addressed by its JSON path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

impl FieldError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("validation failed: {}", summarize(.errors))]
pub struct ValidationError {
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    pub fn new(errors: Vec<FieldError>) -> Self {
        Self { errors }
    }

    pub fn single(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(vec![FieldError::new(path, message)])
    }

    pub fn has_field(&self, path: &str) -> bool {
        self.errors.iter().any(|e| e.path == path)
    }
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| {
            if e.path.is_empty() {
                e.message.clone()
            } else {
                format!("{}: {}", e.path, e.message)
            }
        })
        .collect::<Vec<_>>()
        .join("; ")
}

/// JSON body of every error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(rename = "statusCode", default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Coarse classification of an `ApiClientError`, derived from its status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No response: DNS, refused connection, reset, timeout.
    Transport,
    Validation,
    NotFound,
    Conflict,
    /// Any other 4xx.
    Rejected,
    Server,
    /// A 2xx response whose body did not match the expected shape.
    Unexpected,
}

/// Errors returned by `TodoClient` parse methods and `ApiClient` calls.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message} (status {status_code})")]
pub struct ApiClientError {
    pub message: String,
    pub status_code: u16,
    pub details: Option<serde_json::Value>,
}

impl ApiClientError {
    pub const NETWORK_STATUS: u16 = 0;

    pub fn new(message: impl Into<String>, status_code: u16) -> Self {
        Self {
            message: message.into(),
            status_code,
            details: None,
        }
    }

    /// The request never produced a response.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(message, Self::NETWORK_STATUS)
    }

    /// Map a non-success response, preferring the JSON error envelope and
    /// falling back to the raw body.
    pub fn from_response(response: &HttpResponse) -> Self {
        match serde_json::from_str::<ErrorBody>(&response.body) {
            Ok(body) => Self {
                message: body.message.unwrap_or(body.error),
                status_code: response.status,
                details: body.details,
            },
            Err(_) => {
                let message = if response.body.trim().is_empty() {
                    format!("HTTP {}", response.status)
                } else {
                    response.body.clone()
                };
                Self::new(message, response.status)
            }
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self.status_code {
            0 => ErrorKind::Transport,
            400 | 422 => ErrorKind::Validation,
            404 => ErrorKind::NotFound,
            409 => ErrorKind::Conflict,
            400..=499 => ErrorKind::Rejected,
            500..=599 => ErrorKind::Server,
            _ => ErrorKind::Unexpected,
        }
    }

    pub fn is_network(&self) -> bool {
        self.kind() == ErrorKind::Transport
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    pub fn is_conflict(&self) -> bool {
        self.kind() == ErrorKind::Conflict
    }

    pub fn is_server_error(&self) -> bool {
        self.kind() == ErrorKind::Server
    }
}
