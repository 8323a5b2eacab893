use std::fmt;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Error as JsonError;

#[derive(Debug)]
pub enum AgentApiError {
    InvalidBaseUrl(String),
    InvalidHeader(String),
    Request(reqwest::Error),
    /// The request exceeded its configured timeout.
    Timeout,
    Status(StatusCode, String),
    Unauthorized {
        provider_id: Option<String>,
        message: String,
    },
    Serde(JsonError),
    StreamClosed,
}

/// Error body shapes returned by the backend:
/// `{"name": ..., "data": {"message": ..., "providerID": ...}}`,
/// `{"error": {"message": ...}}` or `{"message": ...}`.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorPayload {
    pub name: Option<String>,
    pub data: Option<ErrorPayloadFields>,
    pub error: Option<ErrorPayloadFields>,
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ErrorPayloadFields {
    pub message: Option<String>,
    #[serde(rename = "providerID")]
    pub provider_id: Option<String>,
}

impl ErrorPayload {
    fn message(&self) -> Option<&str> {
        self.data
            .as_ref()
            .and_then(|data| data.message.as_deref())
            .or_else(|| self.error.as_ref().and_then(|error| error.message.as_deref()))
            .or(self.message.as_deref())
            .and_then(non_empty_string)
    }

    fn provider_id(&self) -> Option<&str> {
        self.data
            .as_ref()
            .and_then(|data| data.provider_id.as_deref())
            .or_else(|| {
                self.error
                    .as_ref()
                    .and_then(|error| error.provider_id.as_deref())
            })
            .and_then(non_empty_string)
    }

    fn is_auth_error(&self) -> bool {
        self.name
            .as_deref()
            .is_some_and(|name| name.ends_with("AuthError"))
    }
}

impl fmt::Display for AgentApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidBaseUrl(value) => write!(f, "invalid base URL: {value}"),
            Self::InvalidHeader(message) => write!(f, "invalid header: {message}"),
            Self::Request(error) => write!(f, "request error: {error}"),
            Self::Timeout => write!(f, "connection timeout"),
            Self::Status(status, message) => write!(f, "HTTP {status} {message}"),
            Self::Unauthorized {
                provider_id: Some(provider_id),
                message,
            } => write!(f, "authentication failed for {provider_id}: {message}"),
            Self::Unauthorized {
                provider_id: None,
                message,
            } => write!(f, "authentication failed: {message}"),
            Self::Serde(error) => write!(f, "serialization error: {error}"),
            Self::StreamClosed => write!(f, "event stream closed by server"),
        }
    }
}

impl std::error::Error for AgentApiError {}

impl From<reqwest::Error> for AgentApiError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else {
            Self::Request(error)
        }
    }
}

impl From<JsonError> for AgentApiError {
    fn from(error: JsonError) -> Self {
        Self::Serde(error)
    }
}

/// Classify a non-success response into an [`AgentApiError`].
pub fn error_from_response(status: StatusCode, body: &str) -> AgentApiError {
    let parsed = serde_json::from_str::<ErrorPayload>(body).ok();
    let message = parse_error_message(status, body);

    let auth_error = parsed.as_ref().is_some_and(ErrorPayload::is_auth_error);
    if auth_error || matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        return AgentApiError::Unauthorized {
            provider_id: parsed
                .as_ref()
                .and_then(ErrorPayload::provider_id)
                .map(ToString::to_string),
            message,
        };
    }

    AgentApiError::Status(status, message)
}

pub fn parse_error_message(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ErrorPayload>(body) {
        if let Some(message) = payload.message() {
            return message.to_string();
        }
        if let Some(name) = payload.name.as_deref().and_then(non_empty_string) {
            return name.to_string();
        }
    }

    if body.trim().is_empty() {
        status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string()
    } else {
        body.to_string()
    }
}

fn non_empty_string(value: &str) -> Option<&str> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value)
    }
}
