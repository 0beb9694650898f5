//! Client error types

use crate::store::StorageError;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Message used when an error response carries nothing readable
pub const DEFAULT_ERROR_MESSAGE: &str = "Request failed";

/// Failed response normalized to a message and status code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub message: String,
    pub status_code: u16,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (HTTP {})", self.message, self.status_code)
    }
}

/// Error payload shape produced by the backend.
///
/// Fields are kept loose; only string values are used as messages.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ErrorBody {
    #[serde(default)]
    detail: Option<Value>,
    #[serde(default)]
    message: Option<Value>,
    #[serde(default)]
    non_field_errors: Option<Value>,
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

impl ErrorBody {
    /// `detail`, then `message`, ignoring empty and non-string values
    pub(crate) fn message(&self) -> Option<&str> {
        self.detail().or_else(|| non_empty_str(self.message.as_ref()))
    }

    pub(crate) fn detail(&self) -> Option<&str> {
        non_empty_str(self.detail.as_ref())
    }

    /// First form-level validation error, as returned by the login endpoint
    pub(crate) fn first_non_field_error(&self) -> Option<&str> {
        self.non_field_errors
            .as_ref()
            .and_then(Value::as_array)
            .and_then(|errors| non_empty_str(errors.first()))
    }
}

impl ApiError {
    pub fn new(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status_code,
        }
    }

    /// Build from a raw error body, falling back to [`DEFAULT_ERROR_MESSAGE`]
    pub fn from_body(status_code: u16, body: &[u8]) -> Self {
        let message = serde_json::from_slice::<ErrorBody>(body)
            .ok()
            .and_then(|parsed| parsed.message().map(str::to_string))
            .unwrap_or_else(|| DEFAULT_ERROR_MESSAGE.to_string());
        Self::new(status_code, message)
    }
}

/// Client error types
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or request error
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Backend answered 401; stored tokens have been cleared
    #[error("Not authenticated: {0}")]
    Unauthenticated(ApiError),

    /// Backend answered with any other non-success status
    #[error("{0}")]
    Api(ApiError),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Token storage could not be written
    #[error("Token storage failed: {0}")]
    Storage(#[from] StorageError),
}

impl ClientError {
    /// Create error from HTTP status code and body
    pub fn from_status(status: reqwest::StatusCode, body: &[u8]) -> Self {
        let error = ApiError::from_body(status.as_u16(), body);
        if status == reqwest::StatusCode::UNAUTHORIZED {
            Self::Unauthenticated(error)
        } else {
            Self::Api(error)
        }
    }

    /// Whether the caller should send the user back to a login page
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::Unauthenticated(_))
    }

    /// Status code of the failed response, if there was one
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Unauthenticated(e) | Self::Api(e) => Some(e.status_code),
            Self::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// Human-readable message suitable for a toast or status line
    pub fn user_message(&self) -> String {
        match self {
            Self::Unauthenticated(e) | Self::Api(e) => e.message.clone(),
            other => other.to_string(),
        }
    }
}
